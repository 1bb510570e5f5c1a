//! Self-growing descriptor pools
//!
//! Each pipeline owns one pool sized from its reflected layout. Capacity is
//! counted in owner allocations, where one allocation is one set per frame in
//! flight. When an allocation would cross capacity the pool is destroyed,
//! grown by the growth factor and every owner that held sets is re-allocated
//! and rewritten from its stored resource list. The caller that triggered the
//! resize gets [`AllocateOutcome::Resized`] and retries.
//!
//! Capacity bookkeeping lives in [`PoolLedger`], which holds no Vulkan
//! handles.

use ash::{vk, Device};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeMap;

use super::descriptor_set::{plan_writes, validate_resources, write_set, BoundResource, PlannedWrite, RawDescriptorPool};
use crate::core::config::DescriptorPoolConfig;
use crate::render::backends::vulkan::{PipelineReflection, VulkanError, VulkanResult};

slotmap::new_key_type! {
    /// Handle to a registered descriptor owner
    pub struct OwnerKey;
}

/// Ledger answer to an allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Room for one more owner allocation
    Granted,
    /// Capacity would be exceeded
    MustResize,
}

/// Result of asking for an owner's sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocateOutcome {
    /// Sets were allocated and written
    Allocated,
    /// The pool was grown instead; retry the allocation
    Resized,
}

#[derive(Debug, Clone, Copy)]
struct OwnerRecord {
    allocated: bool,
    generation: u64,
}

/// Capacity accounting for one descriptor pool
#[derive(Debug, Clone)]
pub struct PoolLedger {
    capacity: u32,
    allocated: u32,
    growth_factor: u32,
    frames: u32,
    histogram: BTreeMap<i32, u32>,
    generation: u64,
    owners: SlotMap<OwnerKey, OwnerRecord>,
    resize_count: u32,
}

impl PoolLedger {
    /// Ledger for `frames` sets per allocation
    pub fn new(capacity: u32, growth_factor: u32, frames: u32, histogram: BTreeMap<i32, u32>) -> Self {
        Self {
            capacity: capacity.max(1),
            allocated: 0,
            growth_factor: growth_factor.max(2),
            frames: frames.max(1),
            histogram,
            generation: 0,
            owners: SlotMap::with_key(),
            resize_count: 0,
        }
    }

    /// Register an owner without sets
    pub fn register(&mut self) -> OwnerKey {
        self.owners.insert(OwnerRecord {
            allocated: false,
            generation: self.generation,
        })
    }

    /// Forget an owner; returns whether it held sets in the current pool
    pub fn unregister(&mut self, key: OwnerKey) -> VulkanResult<bool> {
        let record = self.owners.remove(key).ok_or_else(|| unknown_owner(key))?;
        let live = record.allocated && record.generation == self.generation;
        if live {
            self.allocated -= 1;
        }
        Ok(live)
    }

    /// Ask for one owner allocation
    pub fn request(&self, key: OwnerKey) -> VulkanResult<Grant> {
        let record = self.owners.get(key).ok_or_else(|| unknown_owner(key))?;
        if record.allocated && record.generation == self.generation {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Owner {key:?} already holds descriptor sets"),
            });
        }

        if self.allocated + 1 > self.capacity {
            Ok(Grant::MustResize)
        } else {
            Ok(Grant::Granted)
        }
    }

    /// Record that the owner's sets were allocated
    pub fn commit(&mut self, key: OwnerKey) -> VulkanResult<()> {
        if self.allocated >= self.capacity {
            return Err(VulkanError::Logic(format!(
                "Descriptor pool over capacity ({}/{})",
                self.allocated + 1,
                self.capacity
            )));
        }
        let generation = self.generation;
        let record = self.owners.get_mut(key).ok_or_else(|| unknown_owner(key))?;
        record.allocated = true;
        record.generation = generation;
        self.allocated += 1;
        Ok(())
    }

    /// Grow capacity and start a new generation
    ///
    /// Returns the owners that held sets. They stay stale until re-allocated
    /// and committed against the new pool.
    pub fn grow(&mut self) -> Vec<OwnerKey> {
        let rebuild: Vec<OwnerKey> = self
            .owners
            .iter()
            .filter(|(_, record)| record.allocated)
            .map(|(key, _)| key)
            .collect();

        self.capacity = self.capacity.saturating_mul(self.growth_factor);
        self.generation += 1;
        self.allocated = 0;
        self.resize_count += 1;
        rebuild
    }

    /// Per-type descriptor counts for the Vulkan pool
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        let sets = self.max_sets();
        let sizes: Vec<vk::DescriptorPoolSize> = self
            .histogram
            .iter()
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: vk::DescriptorType::from_raw(*ty),
                descriptor_count: sets * count,
            })
            .collect();

        if sizes.is_empty() {
            // Vulkan rejects a pool with no sizes.
            vec![vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            }]
        } else {
            sizes
        }
    }

    /// Set count for the Vulkan pool
    pub const fn max_sets(&self) -> u32 {
        self.capacity * self.frames
    }

    /// Whether the owner's sets belong to an older pool
    pub fn is_stale(&self, key: OwnerKey) -> bool {
        self.owners
            .get(key)
            .is_some_and(|record| record.allocated && record.generation != self.generation)
    }

    /// Whether the owner currently holds sets
    pub fn holds_sets(&self, key: OwnerKey) -> bool {
        self.owners
            .get(key)
            .is_some_and(|record| record.allocated && record.generation == self.generation)
    }

    /// Whether the owner is registered
    pub fn contains(&self, key: OwnerKey) -> bool {
        self.owners.contains_key(key)
    }

    /// Capacity in owner allocations
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Owner allocations in use
    pub const fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Pool generation, bumped on every resize
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of resizes so far
    pub const fn resize_count(&self) -> u32 {
        self.resize_count
    }

    /// Sets per owner allocation
    pub const fn frames(&self) -> u32 {
        self.frames
    }
}

fn unknown_owner(key: OwnerKey) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: format!("Unknown descriptor owner {key:?}"),
    }
}

struct OwnerSets {
    resources: Vec<BoundResource>,
    sets: Vec<vk::DescriptorSet>,
}

impl OwnerSets {
    /// Validate and swap in a new resource list, then plan a rewrite of every held set
    fn replace_resources(
        &mut self,
        expected: &[vk::DescriptorType],
        resources: Vec<BoundResource>,
    ) -> VulkanResult<Vec<Vec<PlannedWrite>>> {
        validate_resources(expected, &resources)?;
        let writes = plan_frames(&resources, self.sets.len())?;
        self.resources = resources;
        Ok(writes)
    }
}

/// Writes for frame slots `0..frames`
fn plan_frames(resources: &[BoundResource], frames: usize) -> VulkanResult<Vec<Vec<PlannedWrite>>> {
    (0..frames).map(|frame| plan_writes(resources, frame)).collect()
}

/// Owners whose sets died with the previous pool, each with the writes that restore them
fn plan_rebuild(
    ledger: &PoolLedger,
    owners: &SecondaryMap<OwnerKey, OwnerSets>,
) -> VulkanResult<Vec<(OwnerKey, Vec<Vec<PlannedWrite>>)>> {
    let frames = ledger.frames() as usize;
    owners
        .iter()
        .filter(|(key, _)| ledger.is_stale(*key))
        .map(|(key, entry)| Ok((key, plan_frames(&entry.resources, frames)?)))
        .collect()
}

/// Descriptor pool paired with one pipeline's set layout
pub struct DescriptorPoolManager {
    owners: SecondaryMap<OwnerKey, OwnerSets>,
    pending: Vec<OwnerKey>,
    ledger: PoolLedger,
    expected: Vec<vk::DescriptorType>,
    layout: vk::DescriptorSetLayout,
    pool: RawDescriptorPool,
    device: Device,
}

impl DescriptorPoolManager {
    /// Create the initial pool from the pipeline's merged reflection
    pub fn new(
        device: Device,
        layout: vk::DescriptorSetLayout,
        reflection: &PipelineReflection,
        frames: usize,
        config: &DescriptorPoolConfig,
    ) -> VulkanResult<Self> {
        let ledger = PoolLedger::new(
            config.initial_capacity,
            config.growth_factor,
            frames as u32,
            reflection.histogram(),
        );
        let pool = RawDescriptorPool::new(device.clone(), ledger.max_sets(), &ledger.pool_sizes())?;

        log::debug!(
            "Descriptor pool created: capacity {} owners, {} sets",
            ledger.capacity(),
            ledger.max_sets()
        );

        Ok(Self {
            owners: SecondaryMap::new(),
            pending: Vec::new(),
            ledger,
            expected: reflection.binding_types(),
            layout,
            pool,
            device,
        })
    }

    /// Register an owner and its ordered resource list
    pub fn register_owner(&mut self, resources: Vec<BoundResource>) -> VulkanResult<OwnerKey> {
        validate_resources(&self.expected, &resources)?;
        let key = self.ledger.register();
        self.owners.insert(
            key,
            OwnerSets {
                resources,
                sets: Vec::new(),
            },
        );
        Ok(key)
    }

    /// Allocate and write one set per frame for `owner`
    pub fn create_descriptor_sets(&mut self, owner: OwnerKey) -> VulkanResult<AllocateOutcome> {
        if self.ledger.request(owner)? == Grant::MustResize {
            self.resize_and_rebuild()?;
            return Ok(AllocateOutcome::Resized);
        }

        let entry = self.owners.get(owner).ok_or_else(|| unknown_owner(owner))?;
        let writes = plan_frames(&entry.resources, self.ledger.frames() as usize)?;

        match self.allocate_sets() {
            Ok(sets) => {
                self.install(owner, sets, &writes)?;
                Ok(AllocateOutcome::Allocated)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                log::warn!("Descriptor pool exhausted before reaching capacity");
                self.resize_and_rebuild()?;
                Ok(AllocateOutcome::Resized)
            }
            Err(e) => Err(VulkanError::from_vk(e)),
        }
    }

    /// Grow the pool and rebuild every owner that held sets
    pub fn resize_and_rebuild(&mut self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::from_vk)?;

        self.ledger.grow();
        let plan = plan_rebuild(&self.ledger, &self.owners)?;
        log::warn!(
            "Descriptor pool resized to {} owners (generation {}), rebuilding {} owners",
            self.ledger.capacity(),
            self.ledger.generation(),
            plan.len()
        );

        self.pool = RawDescriptorPool::new(self.device.clone(), self.ledger.max_sets(), &self.ledger.pool_sizes())?;
        for owner in self.owners.values_mut() {
            owner.sets.clear();
        }

        for (key, writes) in plan {
            if self.ledger.request(key)? != Grant::Granted {
                return Err(VulkanError::Logic(
                    "Grown descriptor pool cannot hold its previous owners".to_string(),
                ));
            }
            let sets = self.allocate_sets().map_err(|e| {
                VulkanError::Logic(format!("Descriptor allocation failed right after resize: {e:?}"))
            })?;
            self.install(key, sets, &writes)?;
        }

        Ok(())
    }

    /// Replace an owner's resources and rewrite its sets for every frame
    ///
    /// Sets may still be read by frames in flight; callers wait first.
    pub fn update_descriptor_sets(&mut self, owner: OwnerKey, resources: Vec<BoundResource>) -> VulkanResult<()> {
        let entry = self.owners.get_mut(owner).ok_or_else(|| unknown_owner(owner))?;
        let writes = entry.replace_resources(&self.expected, resources)?;
        for (set, frame_writes) in entry.sets.iter().zip(&writes) {
            write_set(&self.device, *set, frame_writes);
        }
        Ok(())
    }

    /// Register and allocate, queueing the owner when the pool had to grow
    pub fn request_sets(&mut self, resources: Vec<BoundResource>) -> VulkanResult<OwnerKey> {
        let key = self.register_owner(resources)?;
        if self.create_descriptor_sets(key)? == AllocateOutcome::Resized {
            self.pending.push(key);
        }
        Ok(key)
    }

    /// Retry owners queued by a resize; returns how many got sets
    pub fn service_pending(&mut self) -> VulkanResult<usize> {
        let queued = std::mem::take(&mut self.pending);
        let mut served = 0;
        for key in queued {
            if !self.ledger.contains(key) || self.ledger.holds_sets(key) {
                continue;
            }
            match self.create_descriptor_sets(key)? {
                AllocateOutcome::Allocated => served += 1,
                AllocateOutcome::Resized => self.pending.push(key),
            }
        }
        Ok(served)
    }

    /// Free an owner's sets and forget it
    pub fn unregister_owner(&mut self, owner: OwnerKey) -> VulkanResult<()> {
        self.pending.retain(|key| *key != owner);
        let entry = self.owners.remove(owner);
        if self.ledger.unregister(owner)? {
            if let Some(entry) = entry {
                self.pool.free(&entry.sets)?;
            }
        }
        Ok(())
    }

    /// The owner's set for a frame slot, if allocated
    pub fn set_for_frame(&self, owner: OwnerKey, frame: usize) -> Option<vk::DescriptorSet> {
        self.sets(owner).and_then(|sets| sets.get(frame).copied())
    }

    /// The owner's sets, one per frame slot, if allocated
    pub fn sets(&self, owner: OwnerKey) -> Option<&[vk::DescriptorSet]> {
        self.owners
            .get(owner)
            .filter(|entry| !entry.sets.is_empty())
            .map(|entry| entry.sets.as_slice())
    }

    /// Whether the owner is waiting for a retry after a resize
    pub fn is_pending(&self, owner: OwnerKey) -> bool {
        self.pending.contains(&owner)
    }

    /// Capacity accounting
    pub const fn ledger(&self) -> &PoolLedger {
        &self.ledger
    }

    fn allocate_sets(&self) -> Result<Vec<vk::DescriptorSet>, vk::Result> {
        let layouts = vec![self.layout; self.ledger.frames() as usize];
        self.pool.allocate(&layouts)
    }

    fn install(
        &mut self,
        owner: OwnerKey,
        sets: Vec<vk::DescriptorSet>,
        writes: &[Vec<PlannedWrite>],
    ) -> VulkanResult<()> {
        let entry = self.owners.get_mut(owner).ok_or_else(|| unknown_owner(owner))?;
        for (set, frame_writes) in sets.iter().zip(writes) {
            write_set(&self.device, *set, frame_writes);
        }
        entry.sets = sets;
        self.ledger.commit(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn histogram() -> BTreeMap<i32, u32> {
        let mut histogram = BTreeMap::new();
        histogram.insert(vk::DescriptorType::UNIFORM_BUFFER.as_raw(), 2);
        histogram.insert(vk::DescriptorType::COMBINED_IMAGE_SAMPLER.as_raw(), 1);
        histogram
    }

    fn allocate(ledger: &mut PoolLedger, key: OwnerKey) -> Grant {
        let grant = ledger.request(key).unwrap();
        if grant == Grant::Granted {
            ledger.commit(key).unwrap();
        }
        grant
    }

    #[test]
    fn test_ninth_owner_triggers_single_resize() {
        let mut ledger = PoolLedger::new(8, 2, 2, histogram());
        let owners: Vec<OwnerKey> = (0..9).map(|_| ledger.register()).collect();

        for key in &owners[..8] {
            assert_eq!(allocate(&mut ledger, *key), Grant::Granted);
        }
        assert_eq!(ledger.allocated(), 8);

        assert_eq!(ledger.request(owners[8]).unwrap(), Grant::MustResize);
        let rebuild = ledger.grow();
        assert_eq!(rebuild.len(), 8);
        assert_eq!(ledger.capacity(), 16);
        assert!(owners[..8].iter().all(|key| ledger.is_stale(*key) && !ledger.holds_sets(*key)));
        assert!(!ledger.is_stale(owners[8]));

        for key in rebuild {
            assert_eq!(allocate(&mut ledger, key), Grant::Granted);
        }
        assert!(owners.iter().all(|key| !ledger.is_stale(*key)));
        assert!(owners[..8].iter().all(|key| ledger.holds_sets(*key)));

        assert_eq!(allocate(&mut ledger, owners[8]), Grant::Granted);
        assert_eq!(ledger.allocated(), 9);
        assert_eq!(ledger.resize_count(), 1);
    }

    #[test]
    fn test_pool_sizes_scale_with_frames() {
        let mut ledger = PoolLedger::new(8, 2, 2, histogram());
        assert_eq!(ledger.max_sets(), 16);

        let sizes = ledger.pool_sizes();
        let uniform = sizes
            .iter()
            .find(|size| size.ty == vk::DescriptorType::UNIFORM_BUFFER)
            .unwrap();
        assert_eq!(uniform.descriptor_count, 32);

        ledger.grow();
        assert_eq!(ledger.max_sets(), 32);
    }

    #[test]
    fn test_repeated_grow_stays_consistent() {
        let mut ledger = PoolLedger::new(2, 2, 3, histogram());
        let owners: Vec<OwnerKey> = (0..2).map(|_| ledger.register()).collect();
        for key in &owners {
            allocate(&mut ledger, *key);
        }

        for round in 1..=3 {
            let rebuild = ledger.grow();
            assert_eq!(rebuild.len(), 2);
            for key in rebuild {
                assert_eq!(allocate(&mut ledger, key), Grant::Granted);
            }
            assert_eq!(ledger.generation(), round);
            assert!(owners.iter().all(|key| ledger.holds_sets(*key)));
        }
        assert_eq!(ledger.capacity(), 16);
        assert_eq!(ledger.allocated(), 2);
    }

    #[test]
    fn test_unregister_releases_capacity() {
        let mut ledger = PoolLedger::new(1, 2, 2, histogram());
        let first = ledger.register();
        let second = ledger.register();

        assert_eq!(allocate(&mut ledger, first), Grant::Granted);
        assert_eq!(ledger.request(second).unwrap(), Grant::MustResize);

        assert!(ledger.unregister(first).unwrap());
        assert_eq!(allocate(&mut ledger, second), Grant::Granted);
        assert!(ledger.unregister(first).is_err());
    }

    #[test]
    fn test_double_allocation_is_rejected() {
        let mut ledger = PoolLedger::new(4, 2, 2, histogram());
        let key = ledger.register();
        allocate(&mut ledger, key);
        assert!(matches!(ledger.request(key), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_empty_histogram_still_has_a_pool_size() {
        let ledger = PoolLedger::new(4, 2, 2, BTreeMap::new());
        assert_eq!(ledger.pool_sizes().len(), 1);
    }

    fn owner_resources(id: u64, frames: u64) -> Vec<BoundResource> {
        let uniform = (0..frames)
            .map(|frame| vk::DescriptorBufferInfo {
                buffer: vk::Buffer::from_raw(id * 10 + frame),
                offset: 0,
                range: 64,
            })
            .collect();
        let texture = vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(id),
            image_view: vk::ImageView::from_raw(id),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        vec![BoundResource::Uniform(uniform), BoundResource::Texture(texture)]
    }

    fn assert_writes_match(writes: &[Vec<PlannedWrite>], id: u64) {
        for (frame, frame_writes) in writes.iter().enumerate() {
            let bindings: Vec<u32> = frame_writes.iter().map(PlannedWrite::binding).collect();
            assert_eq!(bindings, vec![0, 1]);
            match frame_writes[0] {
                PlannedWrite::Buffer { info, .. } => assert_eq!(info.buffer.as_raw(), id * 10 + frame as u64),
                PlannedWrite::Image { .. } => panic!("binding 0 should be a buffer"),
            }
            match frame_writes[1] {
                PlannedWrite::Image { info, .. } => assert_eq!(info.image_view.as_raw(), id),
                PlannedWrite::Buffer { .. } => panic!("binding 1 should be an image"),
            }
        }
    }

    #[test]
    fn test_rebuild_rewrites_each_owner_from_its_own_resources() {
        let frames = 2;
        let mut ledger = PoolLedger::new(8, 2, frames as u32, histogram());
        let mut owners = SecondaryMap::new();
        let mut ids = Vec::new();

        for id in 1..=9 {
            let key = ledger.register();
            owners.insert(
                key,
                OwnerSets {
                    resources: owner_resources(id, frames),
                    sets: Vec::new(),
                },
            );
            ids.push((key, id));
        }
        for (key, _) in &ids[..8] {
            assert_eq!(allocate(&mut ledger, *key), Grant::Granted);
        }
        assert_eq!(ledger.request(ids[8].0).unwrap(), Grant::MustResize);
        assert!(plan_rebuild(&ledger, &owners).unwrap().is_empty());

        ledger.grow();
        let plan = plan_rebuild(&ledger, &owners).unwrap();
        assert_eq!(plan.len(), 8);

        for (key, writes) in &plan {
            let id = ids.iter().find(|(k, _)| k == key).map(|(_, id)| *id).unwrap();
            assert_ne!(id, 9, "the queued owner never held sets");
            assert_eq!(writes.len(), frames as usize);
            assert_writes_match(writes, id);
            assert_eq!(allocate(&mut ledger, *key), Grant::Granted);
        }
        assert!(plan_rebuild(&ledger, &owners).unwrap().is_empty());
    }

    #[test]
    fn test_replacing_a_texture_keeps_bindings_positional() {
        let expected = [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ];
        let mut entry = OwnerSets {
            resources: owner_resources(3, 2),
            sets: vec![vk::DescriptorSet::null(); 2],
        };

        let mut swapped = owner_resources(3, 2);
        swapped[1] = BoundResource::Texture(vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(3),
            image_view: vk::ImageView::from_raw(42),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        });

        let writes = entry.replace_resources(&expected, swapped).unwrap();
        assert_eq!(writes.len(), 2);
        for (frame, frame_writes) in writes.iter().enumerate() {
            let bindings: Vec<u32> = frame_writes.iter().map(PlannedWrite::binding).collect();
            assert_eq!(bindings, vec![0, 1]);
            match frame_writes[0] {
                PlannedWrite::Buffer { info, .. } => assert_eq!(info.buffer.as_raw(), 30 + frame as u64),
                PlannedWrite::Image { .. } => panic!("binding 0 should stay the uniform"),
            }
            match frame_writes[1] {
                PlannedWrite::Image { info, .. } => assert_eq!(info.image_view.as_raw(), 42),
                PlannedWrite::Buffer { .. } => panic!("binding 1 should stay the texture"),
            }
        }
    }

    #[test]
    fn test_mistyped_replacement_leaves_resources_untouched() {
        let expected = [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ];
        let mut entry = OwnerSets {
            resources: owner_resources(5, 2),
            sets: vec![vk::DescriptorSet::null(); 2],
        };

        let mut reversed = owner_resources(6, 2);
        reversed.reverse();
        assert!(entry.replace_resources(&expected, reversed).is_err());
        assert_writes_match(&plan_frames(&entry.resources, 2).unwrap(), 5);
    }
}
