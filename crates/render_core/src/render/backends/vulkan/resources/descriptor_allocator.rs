//! Growable descriptor set allocator
//!
//! Pools are sized from per-type ratios and kept in creation order. An
//! allocation goes to the first pool with room for the whole request. When
//! a pool reports exhaustion (out of pool memory or fragmentation) and
//! auto-expand is enabled, one more pool is appended and the request is
//! retried there; pools are never replaced.
//!
//! Each allocated set is tracked against the pool it came from, so a free
//! goes straight to its owner and a set the allocator never handed out is
//! reported as [`VulkanError::NotFound`].

use ash::{vk, Device};
use std::collections::HashSet;
use std::fmt;

use crate::core::config::{DescriptorAllocatorConfig, PoolSizeRatio};
use crate::foundation::logging::Logger;
use crate::render::backends::vulkan::{VkResultExt, VulkanError, VulkanResult};

/// Pool operations the allocator drives
pub trait DescriptorPoolBackend {
    /// Pool handle
    type Pool: Copy + Eq + fmt::Debug;

    /// Create a pool holding at most `max_sets` sets
    fn create_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VulkanResult<Self::Pool>;

    /// Allocate one set per layout, returning the raw result on failure
    fn allocate(
        &self,
        pool: Self::Pool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>, vk::Result>;

    /// Return sets to their pool
    fn free(&self, pool: Self::Pool, sets: &[vk::DescriptorSet]) -> VulkanResult<()>;

    /// Return every set of the pool
    fn reset(&self, pool: Self::Pool) -> VulkanResult<()>;

    /// Destroy the pool and all its sets
    fn destroy_pool(&self, pool: Self::Pool);
}

/// Descriptor pools on a Vulkan device
pub struct VulkanPoolBackend {
    device: Device,
}

impl VulkanPoolBackend {
    /// Backend creating pools on `device`
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.clone(),
        }
    }
}

impl DescriptorPoolBackend for VulkanPoolBackend {
    type Pool = vk::DescriptorPool;

    fn create_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VulkanResult<vk::DescriptorPool> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(sizes);
        unsafe { self.device.create_descriptor_pool(&pool_info, None) }
            .context("vkCreateDescriptorPool")
    }

    fn allocate(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>, vk::Result> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(layouts);
        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
    }

    fn free(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VulkanResult<()> {
        unsafe { self.device.free_descriptor_sets(pool, sets) }.context("vkFreeDescriptorSets")
    }

    fn reset(&self, pool: vk::DescriptorPool) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }
        .context("vkResetDescriptorPool")
    }

    fn destroy_pool(&self, pool: vk::DescriptorPool) {
        unsafe {
            self.device.destroy_descriptor_pool(pool, None);
        }
    }
}

/// Per-type capacity: `ratio * max_sets * multiplier`, rounded, at least one
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn pool_sizes(
    ratios: &[PoolSizeRatio],
    max_sets: u32,
    multiplier: u32,
) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|ratio| {
            let count = (f64::from(ratio.ratio) * f64::from(max_sets) * f64::from(multiplier)).round();
            vk::DescriptorPoolSize {
                ty: ratio.kind.to_vk(),
                descriptor_count: (count as u32).max(1),
            }
        })
        .collect()
}

fn is_pool_exhaustion(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL
    )
}

struct PoolEntry<P> {
    pool: P,
    allocated_sets: u32,
    sets: HashSet<vk::DescriptorSet>,
}

/// Descriptor set allocator over a growing list of pools
pub struct DescriptorAllocator<B: DescriptorPoolBackend = VulkanPoolBackend> {
    backend: B,
    config: DescriptorAllocatorConfig,
    sizes: Vec<vk::DescriptorPoolSize>,
    pools: Vec<PoolEntry<B::Pool>>,
    logger: Logger,
}

impl DescriptorAllocator<VulkanPoolBackend> {
    /// Allocator creating pools on `device`
    pub fn for_device(
        device: &Device,
        config: &DescriptorAllocatorConfig,
        logger: &Logger,
    ) -> VulkanResult<Self> {
        Self::new(VulkanPoolBackend::new(device), config, logger)
    }
}

impl<B: DescriptorPoolBackend> DescriptorAllocator<B> {
    /// Create the allocator and its first pool
    pub fn new(backend: B, config: &DescriptorAllocatorConfig, logger: &Logger) -> VulkanResult<Self> {
        let logger = logger.with_target("render_core::descriptors");
        if config.max_sets == 0 {
            return Err(VulkanError::Configuration(
                "Descriptor pools need max_sets > 0".to_string(),
            ));
        }

        let mut allocator = Self {
            sizes: pool_sizes(&config.size_ratios, config.max_sets, config.capacity_multiplier),
            backend,
            config: config.clone(),
            pools: Vec::new(),
            logger,
        };
        allocator.create_pool().map_err(|e| {
            allocator
                .logger
                .error(format_args!("Descriptor pool creation failed: {e}"));
            e
        })?;
        Ok(allocator)
    }

    fn create_pool(&mut self) -> VulkanResult<usize> {
        let pool = self
            .backend
            .create_pool(self.config.max_sets, &self.sizes, self.config.pool_flags())?;
        self.pools.push(PoolEntry {
            pool,
            allocated_sets: 0,
            sets: HashSet::new(),
        });
        self.logger.info(format_args!(
            "Descriptor pool #{} created ({} sets)",
            self.pools.len(),
            self.config.max_sets
        ));
        Ok(self.pools.len() - 1)
    }

    fn expand(&mut self) -> VulkanResult<usize> {
        self.create_pool().map_err(|e| {
            self.logger
                .error(format_args!("Descriptor pool expansion failed: {e}"));
            e
        })
    }

    fn exhausted(&self, requested: usize) -> VulkanError {
        self.logger.warn(format_args!(
            "Descriptor pools exhausted: {} pools, {requested} sets requested",
            self.pools.len()
        ));
        VulkanError::ResourceExhausted(format!(
            "{requested} descriptor sets requested, {} pools full and auto-expand disabled",
            self.pools.len()
        ))
    }

    fn record(&mut self, index: usize, sets: &[vk::DescriptorSet]) {
        let entry = &mut self.pools[index];
        entry.sets.extend(sets.iter().copied());
        entry.allocated_sets = u32::try_from(entry.sets.len()).unwrap_or(u32::MAX);
    }

    /// Allocate from a freshly appended pool; exhaustion here is final
    fn allocate_in_new_pool(
        &mut self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let index = self.expand()?;
        match self.backend.allocate(self.pools[index].pool, layouts) {
            Ok(sets) => {
                self.record(index, &sets);
                Ok(sets)
            }
            Err(result) if is_pool_exhaustion(result) => Err(VulkanError::ResourceExhausted(
                format!("{} descriptor sets do not fit an empty pool", layouts.len()),
            )),
            Err(result) => Err::<Vec<vk::DescriptorSet>, _>(result).context("vkAllocateDescriptorSets"),
        }
    }

    /// Allocate one set per layout, all from the same pool
    pub fn allocate_sets_for(
        &mut self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        if layouts.is_empty() {
            return Ok(Vec::new());
        }
        let count = u32::try_from(layouts.len()).unwrap_or(u32::MAX);
        if count > self.config.max_sets {
            return Err(VulkanError::ResourceExhausted(format!(
                "{count} descriptor sets exceed the per-pool limit of {}",
                self.config.max_sets
            )));
        }

        for index in 0..self.pools.len() {
            if self.pools[index].allocated_sets + count > self.config.max_sets {
                continue;
            }
            match self.backend.allocate(self.pools[index].pool, layouts) {
                Ok(sets) => {
                    self.record(index, &sets);
                    return Ok(sets);
                }
                Err(result) if is_pool_exhaustion(result) => {
                    if !self.config.allow_auto_expand {
                        return Err(self.exhausted(layouts.len()));
                    }
                    self.logger.debug(format_args!(
                        "Descriptor pool #{} reported {result:?}, expanding",
                        index + 1
                    ));
                    return self.allocate_in_new_pool(layouts);
                }
                Err(result) => {
                    return Err::<Vec<vk::DescriptorSet>, _>(result).context("vkAllocateDescriptorSets")
                }
            }
        }

        if self.config.allow_auto_expand {
            self.allocate_in_new_pool(layouts)
        } else {
            Err(self.exhausted(layouts.len()))
        }
    }

    /// Allocate a single set
    pub fn allocate_set(&mut self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        self.allocate_sets_for(&[layout])?
            .pop()
            .ok_or_else(|| VulkanError::invalid("allocation returned no descriptor set"))
    }

    /// Allocate `count` sets sharing one layout
    pub fn allocate_sets(
        &mut self,
        layout: vk::DescriptorSetLayout,
        count: usize,
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count];
        self.allocate_sets_for(&layouts)
    }

    /// Return a set to the pool it was allocated from
    pub fn free_set(&mut self, set: vk::DescriptorSet) -> VulkanResult<()> {
        if !self.config.free_individual_sets {
            return Err(VulkanError::invalid(
                "free_set requires pools created with free_individual_sets",
            ));
        }

        let index = self
            .pools
            .iter()
            .position(|entry| entry.sets.contains(&set))
            .ok_or_else(|| VulkanError::NotFound(format!("descriptor set {set:?}")))?;

        self.backend.free(self.pools[index].pool, &[set])?;
        let entry = &mut self.pools[index];
        entry.sets.remove(&set);
        entry.allocated_sets = entry.allocated_sets.saturating_sub(1);
        Ok(())
    }

    /// Reset every pool and zero its counters
    pub fn reset(&mut self) -> VulkanResult<()> {
        for entry in &mut self.pools {
            self.backend.reset(entry.pool)?;
            entry.allocated_sets = 0;
            entry.sets.clear();
        }
        self.logger
            .debug(format_args!("Reset {} descriptor pools", self.pools.len()));
        Ok(())
    }

    /// Number of pools created so far
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Sets currently allocated from pool `index`
    pub fn allocated_in(&self, index: usize) -> Option<u32> {
        self.pools.get(index).map(|entry| entry.allocated_sets)
    }

    /// Sets currently allocated across all pools
    pub fn total_allocated(&self) -> u32 {
        self.pools.iter().map(|entry| entry.allocated_sets).sum()
    }

    /// Per-type capacity of each pool
    pub fn pool_sizes(&self) -> &[vk::DescriptorPoolSize] {
        &self.sizes
    }

    /// Active configuration
    pub fn config(&self) -> &DescriptorAllocatorConfig {
        &self.config
    }
}

impl<B: DescriptorPoolBackend> Drop for DescriptorAllocator<B> {
    fn drop(&mut self) {
        for entry in self.pools.drain(..) {
            self.backend.destroy_pool(entry.pool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DescriptorKind;
    use crate::foundation::logging::MemorySink;
    use ash::vk::Handle;
    use log::Level;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Default)]
    struct MockState {
        next_pool: u32,
        next_set: u64,
        /// Remaining descriptor capacity per pool, in sets
        remaining: HashMap<u32, u32>,
        owners: HashMap<vk::DescriptorSet, u32>,
        destroyed: Vec<u32>,
        freed: Vec<vk::DescriptorSet>,
    }

    /// Pools hold `capacity` sets before reporting out of pool memory
    #[derive(Clone)]
    struct MockBackend {
        capacity: u32,
        state: Rc<RefCell<MockState>>,
    }

    impl MockBackend {
        fn new(capacity: u32) -> Self {
            Self {
                capacity,
                state: Rc::default(),
            }
        }
    }

    impl DescriptorPoolBackend for MockBackend {
        type Pool = u32;

        fn create_pool(
            &self,
            _max_sets: u32,
            _sizes: &[vk::DescriptorPoolSize],
            _flags: vk::DescriptorPoolCreateFlags,
        ) -> VulkanResult<u32> {
            let mut state = self.state.borrow_mut();
            let pool = state.next_pool;
            state.next_pool += 1;
            state.remaining.insert(pool, self.capacity);
            Ok(pool)
        }

        fn allocate(
            &self,
            pool: u32,
            layouts: &[vk::DescriptorSetLayout],
        ) -> Result<Vec<vk::DescriptorSet>, vk::Result> {
            let mut state = self.state.borrow_mut();
            let count = u32::try_from(layouts.len()).expect("Should fit u32");
            let remaining = state.remaining[&pool];
            if remaining < count {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            state.remaining.insert(pool, remaining - count);

            let mut sets = Vec::new();
            for _ in 0..count {
                state.next_set += 1;
                let set = vk::DescriptorSet::from_raw(state.next_set);
                state.owners.insert(set, pool);
                sets.push(set);
            }
            Ok(sets)
        }

        fn free(&self, pool: u32, sets: &[vk::DescriptorSet]) -> VulkanResult<()> {
            let mut state = self.state.borrow_mut();
            for set in sets {
                assert_eq!(state.owners.remove(set), Some(pool), "Should free from owning pool");
                state.freed.push(*set);
            }
            *state.remaining.get_mut(&pool).expect("Should know pool") += 1;
            Ok(())
        }

        fn reset(&self, pool: u32) -> VulkanResult<()> {
            let mut state = self.state.borrow_mut();
            state.owners.retain(|_, owner| *owner != pool);
            state.remaining.insert(pool, self.capacity);
            Ok(())
        }

        fn destroy_pool(&self, pool: u32) {
            self.state.borrow_mut().destroyed.push(pool);
        }
    }

    fn layout() -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::from_raw(0xabc)
    }

    fn config(max_sets: u32, auto_expand: bool) -> DescriptorAllocatorConfig {
        DescriptorAllocatorConfig::default()
            .with_max_sets(max_sets)
            .with_auto_expand(auto_expand)
    }

    /// Default ratios give the documented per-type capacities
    #[test]
    fn test_default_pool_sizes() {
        let config = DescriptorAllocatorConfig::default();
        let sizes = pool_sizes(&config.size_ratios, config.max_sets, config.capacity_multiplier);

        let counts: Vec<(vk::DescriptorType, u32)> =
            sizes.iter().map(|size| (size.ty, size.descriptor_count)).collect();
        assert_eq!(
            counts,
            vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 5000),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3000),
                (vk::DescriptorType::STORAGE_BUFFER, 2000),
            ]
        );
    }

    /// Tiny ratios still reserve one descriptor
    #[test]
    fn test_pool_sizes_minimum_one() {
        let ratios = [PoolSizeRatio::new(DescriptorKind::StorageImage, 0.0001)];
        let sizes = pool_sizes(&ratios, 2, 1);
        assert_eq!(sizes[0].descriptor_count, 1);
    }

    /// A zero set limit is rejected before any pool is created
    #[test]
    fn test_zero_max_sets_rejected() {
        let backend = MockBackend::new(4);
        let result = DescriptorAllocator::new(backend.clone(), &config(0, true), &Logger::disabled());

        assert!(matches!(result, Err(VulkanError::Configuration(_))));
        assert_eq!(backend.state.borrow().next_pool, 0);
    }

    /// After reset a single pool holds max_sets; one more fails without expansion
    #[test]
    fn test_reset_then_fill_single_pool() {
        let mut allocator =
            DescriptorAllocator::new(MockBackend::new(8), &config(4, false), &Logger::disabled())
                .expect("Should create allocator");

        allocator.allocate_sets(layout(), 3).expect("Should allocate");
        allocator.reset().expect("Should reset");
        assert_eq!(allocator.total_allocated(), 0);

        let sets = allocator.allocate_sets(layout(), 4).expect("Should fill pool");
        assert_eq!(sets.len(), 4);
        assert_eq!(allocator.pool_count(), 1);

        let err = allocator
            .allocate_set(layout())
            .expect_err("Should be exhausted");
        assert!(matches!(err, VulkanError::ResourceExhausted(_)));
        assert_eq!(allocator.pool_count(), 1);
    }

    /// M + 1 sets with auto-expand leave two pools, the second holding one set
    #[test]
    fn test_auto_expand_appends_pool() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::new(sink.clone());
        let mut allocator = DescriptorAllocator::new(MockBackend::new(16), &config(4, true), &logger)
            .expect("Should create allocator");

        for _ in 0..5 {
            allocator.allocate_set(layout()).expect("Should allocate");
        }

        assert_eq!(allocator.pool_count(), 2);
        assert_eq!(allocator.allocated_in(0), Some(4));
        assert_eq!(allocator.allocated_in(1), Some(1));
        assert!(sink.contains(Level::Info, "Descriptor pool #2 created"));
    }

    /// Driver-reported exhaustion expands when allowed and fails otherwise
    #[test]
    fn test_driver_exhaustion() {
        let mut allocator =
            DescriptorAllocator::new(MockBackend::new(2), &config(10, true), &Logger::disabled())
                .expect("Should create allocator");
        allocator.allocate_sets(layout(), 2).expect("Should allocate");
        allocator.allocate_set(layout()).expect("Should expand");
        assert_eq!(allocator.pool_count(), 2);
        assert_eq!(allocator.allocated_in(1), Some(1));

        let mut allocator =
            DescriptorAllocator::new(MockBackend::new(2), &config(10, false), &Logger::disabled())
                .expect("Should create allocator");
        allocator.allocate_sets(layout(), 2).expect("Should allocate");
        let err = allocator
            .allocate_set(layout())
            .expect_err("Should be exhausted");
        assert!(matches!(err, VulkanError::ResourceExhausted(_)));
        assert_eq!(allocator.pool_count(), 1);
    }

    /// Requests larger than one pool can never succeed
    #[test]
    fn test_oversized_request() {
        let mut allocator =
            DescriptorAllocator::new(MockBackend::new(16), &config(4, true), &Logger::disabled())
                .expect("Should create allocator");

        let err = allocator
            .allocate_sets(layout(), 5)
            .expect_err("Should reject oversized request");
        assert!(matches!(err, VulkanError::ResourceExhausted(_)));
        assert!(allocator.allocate_sets(layout(), 0).expect("Should allow empty").is_empty());
    }

    /// Frees go to the owning pool and unknown sets are reported
    #[test]
    fn test_free_set() {
        let backend = MockBackend::new(16);
        let mut allocator = DescriptorAllocator::new(backend.clone(), &config(2, true), &Logger::disabled())
            .expect("Should create allocator");

        let first = allocator.allocate_sets(layout(), 2).expect("Should allocate");
        let second = allocator.allocate_set(layout()).expect("Should allocate");
        assert_eq!(allocator.pool_count(), 2);

        allocator.free_set(second).expect("Should free");
        allocator.free_set(first[0]).expect("Should free");
        assert_eq!(allocator.allocated_in(0), Some(1));
        assert_eq!(allocator.allocated_in(1), Some(0));
        assert_eq!(backend.state.borrow().freed, vec![second, first[0]]);

        let err = allocator.free_set(second).expect_err("Should reject double free");
        assert!(matches!(err, VulkanError::NotFound(_)));
        let err = allocator
            .free_set(vk::DescriptorSet::from_raw(0xdead))
            .expect_err("Should reject unknown set");
        assert!(matches!(err, VulkanError::NotFound(_)));
    }

    /// Individual frees require the pool flag
    #[test]
    fn test_free_without_flag() {
        let config = config(4, true).with_free_individual_sets(false);
        let mut allocator = DescriptorAllocator::new(MockBackend::new(16), &config, &Logger::disabled())
            .expect("Should create allocator");
        let set = allocator.allocate_set(layout()).expect("Should allocate");

        let err = allocator.free_set(set).expect_err("Should reject free");
        assert!(matches!(err, VulkanError::InvalidOperation { .. }));
        assert_eq!(allocator.total_allocated(), 1);
    }

    /// Dropping the allocator destroys every pool
    #[test]
    fn test_drop_destroys_pools() {
        let backend = MockBackend::new(16);
        {
            let mut allocator =
                DescriptorAllocator::new(backend.clone(), &config(1, true), &Logger::disabled())
                    .expect("Should create allocator");
            allocator.allocate_sets(layout(), 1).expect("Should allocate");
            allocator.allocate_sets(layout(), 1).expect("Should allocate");
            allocator.allocate_sets(layout(), 1).expect("Should allocate");
            assert_eq!(allocator.pool_count(), 3);
        }
        assert_eq!(backend.state.borrow().destroyed, vec![0, 1, 2]);
    }
}
