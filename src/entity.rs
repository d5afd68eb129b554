//! The entity capability every stored type provides.

/// A value with a caller-supplied string identity.
///
/// The identity doubles as the store key: `save` writes the entity under
/// [`Entity::to_id`] and `find` looks it up by the same string.
///
/// ```
/// use entity_store::Entity;
///
/// #[derive(Clone)]
/// struct Account {
///     id: u64,
/// }
///
/// impl Entity for Account {
///     fn to_id(&self) -> String {
///         format!("account:{}", self.id)
///     }
/// }
///
/// assert_eq!(Account { id: 7 }.to_id(), "account:7");
/// assert_eq!(Account::entity_name(), "Account");
/// ```
pub trait Entity: Clone + Send + Sync + 'static {
    fn to_id(&self) -> String;

    /// Short type name used in owner ids, log fields and metric labels.
    fn entity_name() -> &'static str
    where
        Self: Sized,
    {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Last path segment of a type name, keeping generic arguments intact.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base_end = full.find('<').unwrap_or(full.len());
    let start = full[..base_end].rfind("::").map_or(0, |i| i + 2);
    &full[start..]
}
