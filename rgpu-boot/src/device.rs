//! Logical device creation.
//!
//! Builds one queue per distinct family from the resolved
//! [`QueueFamilyIndices`], enables the device extensions (the selection
//! criteria's required list unless overridden), and fetches the graphics
//! and present queues.

use std::collections::BTreeSet;

use ash::vk;
use serde::Deserialize;
use thiserror::Error;

use crate::driver::{DeviceRequest, Driver, QueueRequest, to_cstrings};
use crate::instance::InstanceConfig;
use crate::queue::QueueFamilyIndices;
use crate::select::SelectionCriteria;
use crate::state::RuntimeState;

pub const QUEUE_PRIORITY: f32 = 1.0;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Cannot create a logical device before a physical device is selected")]
    NoPhysicalDevice,
    #[error("Queue families {0:?} do not cover both graphics and present")]
    IncompleteQueues(QueueFamilyIndices),
    #[error("A logical device was already created for this runtime state")]
    AlreadyCreated,
    #[error("Name contains an interior NUL: {0:?}")]
    InvalidName(String),
    #[error("Failed to create logical device: {0}")]
    Creation(vk::Result),
    #[error("Failed to fetch device queue: {0}")]
    Queue(vk::Result),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogicalDeviceConfig {
    /// Device extensions to enable. `None` enables the selection criteria's
    /// required extensions.
    pub extensions: Option<Vec<String>>,
}

/// The resolved inputs for `vkCreateDevice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalDeviceRequest {
    pub queue_families: BTreeSet<u32>,
    pub extensions: Vec<String>,
    pub layers: Vec<String>,
}

impl LogicalDeviceRequest {
    /// Device layers mirror the validation layers, and only those that the
    /// instance actually enabled.
    pub fn new(
        indices: &QueueFamilyIndices,
        config: &LogicalDeviceConfig,
        criteria: &SelectionCriteria,
        instance: &InstanceConfig,
    ) -> Self {
        let layers = if instance.enable_validation {
            instance
                .validation_layers
                .iter()
                .filter(|layer| instance.layers.contains(*layer))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Self {
            queue_families: indices.unique_families(),
            extensions: config
                .extensions
                .clone()
                .unwrap_or_else(|| criteria.required_extensions.clone()),
            layers,
        }
    }
}

/// Creates the logical device for the physical device in `state` and
/// stores it, plus its graphics and present queues, back into `state`.
pub fn create_logical_device<D: Driver + ?Sized>(
    driver: &mut D,
    state: &mut RuntimeState,
    request: &LogicalDeviceRequest,
) -> Result<vk::Device, DeviceError> {
    use DeviceError as Error;
    let _span = tracing::debug_span!("create_logical_device").entered();

    let (Some(physical_device), Some(indices)) =
        (state.physical_device, state.queue_families)
    else {
        tracing::error!("Cannot create a logical device without a physical device!");
        return Err(Error::NoPhysicalDevice);
    };
    let (Some(graphics_family), Some(present_family)) =
        (indices.graphics, indices.present)
    else {
        return Err(Error::IncompleteQueues(indices));
    };
    if state.device.is_some() {
        return Err(Error::AlreadyCreated);
    }

    let queues: Vec<QueueRequest> = request
        .queue_families
        .iter()
        .map(|&family_index| QueueRequest {
            family_index,
            priority: QUEUE_PRIORITY,
        })
        .collect();
    let extensions = to_cstrings(&request.extensions).map_err(Error::InvalidName)?;
    let layers = to_cstrings(&request.layers).map_err(Error::InvalidName)?;

    tracing::debug!(
        "Creating device with queue families {:?}, extensions {:?}, layers {:?}",
        request.queue_families,
        request.extensions,
        request.layers
    );

    let device = driver
        .create_device(
            physical_device,
            &DeviceRequest {
                queues: &queues,
                extensions: &extensions,
                layers: &layers,
                features: vk::PhysicalDeviceFeatures::default(),
            },
        )
        .map_err(|e| {
            tracing::error!("Failed to create logical device: {e}");
            Error::Creation(e)
        })?;
    state.device = Some(device);

    let graphics_queue = driver
        .device_queue(device, graphics_family, 0)
        .map_err(Error::Queue)?;
    let present_queue = driver
        .device_queue(device, present_family, 0)
        .map_err(Error::Queue)?;
    state.graphics_queue = Some(graphics_queue);
    state.present_queue = Some(present_queue);

    tracing::debug!(
        "Created device {:?} (graphics queue {:?}, present queue {:?})",
        device,
        graphics_queue,
        present_queue
    );
    Ok(device)
}
