use ash::vk;
use thiserror::Error;

use crate::debug::{DebugChannel, teardown_debug_channel};
use crate::driver::Driver;
use crate::queue::QueueFamilyIndices;

/// Every handle the bootstrap has created so far.
///
/// Stages fill this in as they succeed; [`cleanup`] empties it again. A
/// partially bootstrapped state is valid input to [`cleanup`].
#[derive(Debug, Default)]
pub struct RuntimeState {
    pub instance: Option<vk::Instance>,
    pub debug_channel: Option<DebugChannel>,
    pub surface: Option<vk::SurfaceKHR>,
    pub physical_device: Option<vk::PhysicalDevice>,
    pub queue_families: Option<QueueFamilyIndices>,
    pub device: Option<vk::Device>,
    pub graphics_queue: Option<vk::Queue>,
    pub present_queue: Option<vk::Queue>,
}

impl RuntimeState {
    pub fn is_empty(&self) -> bool {
        self.instance.is_none()
            && self.debug_channel.is_none()
            && self.surface.is_none()
            && self.device.is_none()
    }
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Instance children outlived the instance")]
    MissingInstance,
}

/// Destroys everything in `state` in reverse creation order.
///
/// Device, debug messenger, surface, then instance. Each handle is taken out
/// of `state` as it is destroyed, so calling this twice is harmless. The
/// window the surface was made from must be dropped after this returns.
pub fn cleanup<D: Driver + ?Sized>(
    driver: &mut D,
    state: &mut RuntimeState,
) -> Result<(), CleanupError> {
    let _span = tracing::debug_span!("cleanup").entered();
    let mut orphaned = false;

    state.graphics_queue = None;
    state.present_queue = None;
    if let Some(device) = state.device.take() {
        tracing::debug!("Destroying device {:?}", device);
        driver.destroy_device(device);
    }

    if teardown_debug_channel(state).is_err() {
        orphaned = true;
    }

    if let Some(surface) = state.surface.take() {
        match state.instance {
            Some(instance) => {
                tracing::debug!("Destroying surface {:?}", surface);
                driver.destroy_surface(instance, surface);
            }
            None => {
                tracing::error!("Surface {:?} outlived its instance", surface);
                orphaned = true;
            }
        }
    }

    state.physical_device = None;
    state.queue_families = None;
    if let Some(instance) = state.instance.take() {
        tracing::debug!("Destroying instance {:?}", instance);
        driver.destroy_instance(instance);
    }

    if orphaned {
        Err(CleanupError::MissingInstance)
    } else {
        Ok(())
    }
}
