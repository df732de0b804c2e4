//! Tunables for component storage.

/// The number of slots a new store starts with.
pub const DEFAULT_INITIAL_CAPACITY: usize = 10;

/// The factor a store's capacity is multiplied by when it runs out of slots.
pub const DEFAULT_GROWTH_FACTOR: usize = 2;

/// Settings applied to every `ComponentStore` a `ComponentManager` creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    initial_capacity: usize,
    growth_factor: usize,
}

impl StoreConfig {
    /// Create a config with the default settings.
    pub fn new() -> StoreConfig {
        StoreConfig {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            growth_factor: DEFAULT_GROWTH_FACTOR,
        }
    }

    /// Set the number of slots allocated when a store is created.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> StoreConfig {
        self.initial_capacity = initial_capacity.max(1);
        self
    }

    /// Set the capacity multiplier used when a store grows.
    ///
    /// Stores always at least double, so factors below two are raised to two.
    pub fn with_growth_factor(mut self, growth_factor: usize) -> StoreConfig {
        self.growth_factor = growth_factor.max(2);
        self
    }

    /// Get the number of slots allocated when a store is created.
    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// Get the capacity multiplier used when a store grows.
    pub fn growth_factor(&self) -> usize {
        self.growth_factor
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::new()
    }
}
