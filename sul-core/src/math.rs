/// Type alias for sets, we use this to hide which type of `HashSet` we are actually using.
/// Iteration follows insertion order.
pub type Set<S> = indexmap::IndexSet<S>;
/// Type alias for maps, we use this to hide which type of `HashMap` we are actually using.
/// Iteration follows insertion order, which some callers rely on for tie breaking.
pub type Map<K, V> = indexmap::IndexMap<K, V>;
