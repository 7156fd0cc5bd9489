//! Process-wide registry of synchronization events
//!
//! One signal block per live entity (camera, projector, encoder, decoder,
//! plus the single main block), each holding the fixed array of events for
//! every symbolic code its group owns. Collections are guarded by one
//! registry-wide lock per group: shared for lookups, exclusive for add and
//! remove. Lookups hand out `Arc<Event>` handles, so waits block on the OS
//! primitive without holding any registry lock.

use std::sync::{Arc, RwLock};

use log::debug;

use crate::error::{FringeError, Result};

use super::codes::{EventCode, EventGroup};
use super::event::Event;

/// Fixed array of events for one group instance
#[derive(Debug)]
struct SignalBlock {
    events: Vec<Arc<Event>>,
}

impl SignalBlock {
    /// Allocate every event the group owns; fails atomically (all or none,
    /// partially created events are released on the error path)
    fn create(group: EventGroup) -> Result<Self> {
        let mut events = Vec::with_capacity(group.code_count());
        for _ in 0..group.code_count() {
            let event = Event::new_shared()
                .map_err(|e| FringeError::event_creation(group.name(), e.to_string()))?;
            events.push(event);
        }
        Ok(Self { events })
    }

    fn event(&self, index: usize) -> Arc<Event> {
        Arc::clone(&self.events[index])
    }

    fn reset_all(&self) {
        for event in &self.events {
            event.reset();
        }
    }
}

type BlockSlots = RwLock<Vec<Option<SignalBlock>>>;

/// Registry of all synchronization events, grouped by owning entity
#[derive(Debug)]
pub struct EventRegistry {
    cameras: BlockSlots,
    draws: BlockSlots,
    encoders: BlockSlots,
    decoders: BlockSlots,
    main: SignalBlock,
}

impl EventRegistry {
    /// Create a registry with the main block allocated
    pub fn new() -> Result<Self> {
        Ok(Self {
            cameras: RwLock::new(Vec::new()),
            draws: RwLock::new(Vec::new()),
            encoders: RwLock::new(Vec::new()),
            decoders: RwLock::new(Vec::new()),
            main: SignalBlock::create(EventGroup::Main)?,
        })
    }

    /// Create a shared registry handle
    pub fn new_shared() -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new()?))
    }

    fn slots(&self, group: EventGroup) -> &BlockSlots {
        match group {
            EventGroup::Camera => &self.cameras,
            EventGroup::Draw => &self.draws,
            EventGroup::Encoder => &self.encoders,
            EventGroup::Decoder => &self.decoders,
            EventGroup::Main => unreachable!("main group has no slot collection"),
        }
    }

    fn add_instance(&self, group: EventGroup) -> Result<usize> {
        let block = SignalBlock::create(group)?;
        let mut slots = self.slots(group).write().unwrap();
        // Reuse a tombstoned slot when one exists, otherwise grow
        let index = match slots.iter().position(|s| s.is_none()) {
            Some(free) => {
                slots[free] = Some(block);
                free
            }
            None => {
                slots.push(Some(block));
                slots.len() - 1
            }
        };
        debug!("registered {} instance {}", group, index);
        Ok(index)
    }

    fn remove_instance(&self, group: EventGroup, index: usize) -> Result<()> {
        let mut slots = self.slots(group).write().unwrap();
        match slots.get_mut(index) {
            Some(slot @ Some(_)) => {
                // Tombstone the slot so other live indices stay valid;
                // trailing tombstones shrink the collection for real
                *slot = None;
                while matches!(slots.last(), Some(None)) {
                    slots.pop();
                }
                debug!("removed {} instance {}", group, index);
                Ok(())
            }
            _ => Err(FringeError::instance_not_found(group.name(), index)),
        }
    }

    fn live_count(&self, group: EventGroup) -> usize {
        self.slots(group)
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.is_some())
            .count()
    }

    /// Register a camera; returns its instance index
    pub fn add_camera(&self) -> Result<usize> {
        self.add_instance(EventGroup::Camera)
    }

    /// Register a projector/drawing thread; returns its instance index
    pub fn add_projector(&self) -> Result<usize> {
        self.add_instance(EventGroup::Draw)
    }

    /// Register an encoder; returns its instance index
    pub fn add_encoder(&self) -> Result<usize> {
        self.add_instance(EventGroup::Encoder)
    }

    /// Register a decoder; returns its instance index
    pub fn add_decoder(&self) -> Result<usize> {
        self.add_instance(EventGroup::Decoder)
    }

    /// Unregister a camera instance
    pub fn remove_camera(&self, index: usize) -> Result<()> {
        self.remove_instance(EventGroup::Camera, index)
    }

    /// Unregister a projector instance
    pub fn remove_projector(&self, index: usize) -> Result<()> {
        self.remove_instance(EventGroup::Draw, index)
    }

    /// Unregister an encoder instance
    pub fn remove_encoder(&self, index: usize) -> Result<()> {
        self.remove_instance(EventGroup::Encoder, index)
    }

    /// Unregister a decoder instance
    pub fn remove_decoder(&self, index: usize) -> Result<()> {
        self.remove_instance(EventGroup::Decoder, index)
    }

    /// Number of live camera instances
    pub fn camera_count(&self) -> usize {
        self.live_count(EventGroup::Camera)
    }

    /// Number of live projector instances
    pub fn projector_count(&self) -> usize {
        self.live_count(EventGroup::Draw)
    }

    /// Number of live encoder instances
    pub fn encoder_count(&self) -> usize {
        self.live_count(EventGroup::Encoder)
    }

    /// Number of live decoder instances
    pub fn decoder_count(&self) -> usize {
        self.live_count(EventGroup::Decoder)
    }

    /// Number of slots (live + tombstoned) in the camera collection
    pub fn camera_slots(&self) -> usize {
        self.cameras.read().unwrap().len()
    }

    /// Look up the event for `(code, instance)`
    ///
    /// The returned handle stays valid even if the instance is removed while
    /// a wait is in flight; the fd closes when the last handle drops.
    pub fn event(&self, code: impl Into<EventCode>, instance: usize) -> Result<Arc<Event>> {
        let code = code.into();
        let group = code.group();
        if group == EventGroup::Main {
            if instance != 0 {
                debug_assert!(false, "main group has a single instance");
                return Err(FringeError::invalid_event(code.to_string(), instance));
            }
            return Ok(self.main.event(code.index()));
        }
        let slots = self.slots(group).read().unwrap();
        match slots.get(instance) {
            Some(Some(block)) => Ok(block.event(code.index())),
            _ => {
                debug!("lookup of dead {} instance {}", group, instance);
                Err(FringeError::invalid_event(code.to_string(), instance))
            }
        }
    }

    /// Signal an event
    pub fn set(&self, code: impl Into<EventCode>, instance: usize) -> Result<()> {
        self.event(code, instance)?.set()
    }

    /// Clear an event; returns whether it was signaled
    pub fn reset(&self, code: impl Into<EventCode>, instance: usize) -> Result<bool> {
        Ok(self.event(code, instance)?.reset())
    }

    /// Non-blocking signaled-state check
    pub fn is_signaled(&self, code: impl Into<EventCode>, instance: usize) -> Result<bool> {
        Ok(self.event(code, instance)?.is_signaled())
    }

    /// Counted set: the event only fires once its barrier width is reached.
    /// Returns whether the underlying event actually fired.
    pub fn set_conditional(&self, code: impl Into<EventCode>, instance: usize) -> Result<bool> {
        self.event(code, instance)?.set_conditional()
    }

    /// Counted reset, symmetric to `set_conditional`
    pub fn reset_conditional(&self, code: impl Into<EventCode>, instance: usize) -> Result<bool> {
        Ok(self.event(code, instance)?.reset_conditional())
    }

    /// Pre-arm the set-side barrier width (e.g. number of attached cameras)
    pub fn configure_set_counter(
        &self,
        code: impl Into<EventCode>,
        instance: usize,
        start: i64,
    ) -> Result<()> {
        self.event(code, instance)?.set_barrier().set_start(start);
        Ok(())
    }

    /// Pre-arm the reset-side barrier width
    pub fn configure_reset_counter(
        &self,
        code: impl Into<EventCode>,
        instance: usize,
        start: i64,
    ) -> Result<()> {
        self.event(code, instance)?.reset_barrier().set_start(start);
        Ok(())
    }

    /// Arrivals still needed before the set-side barrier trips
    pub fn set_counter_remaining(
        &self,
        code: impl Into<EventCode>,
        instance: usize,
    ) -> Result<i64> {
        Ok(self.event(code, instance)?.set_barrier().remaining())
    }

    /// Configured set-side barrier width
    pub fn set_counter_start(&self, code: impl Into<EventCode>, instance: usize) -> Result<i64> {
        Ok(self.event(code, instance)?.set_barrier().start_value())
    }

    fn reset_all(&self, group: EventGroup, instance: usize) -> Result<()> {
        if group == EventGroup::Main {
            self.main.reset_all();
            return Ok(());
        }
        let slots = self.slots(group).read().unwrap();
        match slots.get(instance) {
            Some(Some(block)) => {
                block.reset_all();
                Ok(())
            }
            _ => Err(FringeError::instance_not_found(group.name(), instance)),
        }
    }

    /// Clear every event a camera instance owns (race-free batch preparation)
    pub fn reset_all_camera(&self, instance: usize) -> Result<()> {
        self.reset_all(EventGroup::Camera, instance)
    }

    /// Clear every event a projector instance owns
    pub fn reset_all_draw(&self, instance: usize) -> Result<()> {
        self.reset_all(EventGroup::Draw, instance)
    }

    /// Clear every event an encoder instance owns
    pub fn reset_all_encoder(&self, instance: usize) -> Result<()> {
        self.reset_all(EventGroup::Encoder, instance)
    }

    /// Clear every event a decoder instance owns
    pub fn reset_all_decoder(&self, instance: usize) -> Result<()> {
        self.reset_all(EventGroup::Decoder, instance)
    }

    /// Clear the main group's events
    pub fn reset_all_main(&self) -> Result<()> {
        self.reset_all(EventGroup::Main, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::codes::{CameraCode, DrawCode, MainCode};

    #[test]
    fn lookup_resolves_live_instances() {
        let registry = EventRegistry::new().unwrap();
        let cam = registry.add_camera().unwrap();
        assert_eq!(cam, 0);

        registry.set(CameraCode::Ready, cam).unwrap();
        assert!(registry.is_signaled(CameraCode::Ready, cam).unwrap());
        assert!(registry.reset(CameraCode::Ready, cam).unwrap());
        assert!(!registry.is_signaled(CameraCode::Ready, cam).unwrap());
    }

    #[test]
    fn removal_tombstones_middle_slots() {
        let registry = EventRegistry::new().unwrap();
        let c0 = registry.add_camera().unwrap();
        let c1 = registry.add_camera().unwrap();
        let c2 = registry.add_camera().unwrap();

        registry.remove_camera(c1).unwrap();
        assert_eq!(registry.camera_count(), 2);
        // Middle removal keeps the collection length so other indices hold
        assert_eq!(registry.camera_slots(), 3);
        assert!(registry.event(CameraCode::Ready, c0).is_ok());
        assert!(registry.event(CameraCode::Ready, c2).is_ok());

        // Removing the last live instance shrinks through the tombstone
        registry.remove_camera(c2).unwrap();
        assert_eq!(registry.camera_slots(), 1);
    }

    #[test]
    fn main_group_is_single_instance() {
        let registry = EventRegistry::new().unwrap();
        registry.set(MainCode::AbortBatch, 0).unwrap();
        assert!(registry.is_signaled(MainCode::AbortBatch, 0).unwrap());
        registry.reset_all_main().unwrap();
        assert!(!registry.is_signaled(MainCode::AbortBatch, 0).unwrap());
    }

    #[test]
    fn conditional_set_respects_configured_width() {
        let registry = EventRegistry::new().unwrap();
        let proj = registry.add_projector().unwrap();
        registry
            .configure_set_counter(DrawCode::SyncTriggers, proj, 2)
            .unwrap();

        assert!(!registry.set_conditional(DrawCode::SyncTriggers, proj).unwrap());
        assert!(!registry.is_signaled(DrawCode::SyncTriggers, proj).unwrap());
        assert!(registry.set_conditional(DrawCode::SyncTriggers, proj).unwrap());
        assert!(registry.is_signaled(DrawCode::SyncTriggers, proj).unwrap());
        assert_eq!(
            registry.set_counter_remaining(DrawCode::SyncTriggers, proj).unwrap(),
            2
        );
    }

    #[test]
    fn reset_all_clears_every_code() {
        let registry = EventRegistry::new().unwrap();
        let cam = registry.add_camera().unwrap();
        for code in CameraCode::ALL {
            registry.set(code, cam).unwrap();
        }
        registry.reset_all_camera(cam).unwrap();
        for code in CameraCode::ALL {
            assert!(!registry.is_signaled(code, cam).unwrap());
        }
    }
}
