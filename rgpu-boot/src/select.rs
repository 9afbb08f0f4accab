//! Physical device scoring and selection.
//!
//! Every enumerated device is rated against [`SelectionCriteria`]. A device
//! that misses a hard requirement (geometry shaders, a complete queue
//! configuration, the required device extensions) scores 0 and can never be
//! picked. The highest positive score wins.

use std::collections::BTreeMap;

use ash::vk;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::{SwapchainSupportDetails, log_catalog};
use crate::driver::Driver;
use crate::instance::VkVersion;
use crate::queue::{QueueFamilyIndices, resolve_queue_families};
use crate::state::RuntimeState;

pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Cannot select a physical device before the instance exists")]
    NoInstance,
    #[error("Cannot select a physical device before the surface exists")]
    NoSurface,
    #[error("Failed to find GPUs with Vulkan support")]
    NoDevices,
    #[error("Failed to find a suitable GPU")]
    NoSuitableDevice,
    #[error("Vulkan error while querying physical devices: {0}")]
    Driver(vk::Result),
}

/// Weights and hard requirements used to rate physical devices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelectionCriteria {
    pub discrete_bonus: i64,
    pub image_dimension_weight: f32,
    pub ideal_queue_bonus: i64,
    pub required_extensions: Vec<String>,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            discrete_bonus: 1000,
            image_dimension_weight: 1.0,
            ideal_queue_bonus: 250,
            required_extensions: vec![SWAPCHAIN_EXTENSION.to_owned()],
        }
    }
}

/// What the scorer knows about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport {
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub geometry_shader: bool,
    pub queue_families: QueueFamilyIndices,
    /// Required device extensions the device does not offer.
    pub missing_extensions: Vec<String>,
}

impl SelectionCriteria {
    pub fn score(&self, report: &DeviceReport) -> i64 {
        if !report.geometry_shader {
            tracing::debug!("Device rejected: no geometry shader support");
            return 0;
        }
        if !report.queue_families.is_complete() {
            tracing::debug!(
                "Device rejected: incomplete queue families {:?}",
                report.queue_families
            );
            return 0;
        }
        if !report.missing_extensions.is_empty() {
            tracing::debug!(
                "Device rejected: missing extensions {:?}",
                report.missing_extensions
            );
            return 0;
        }

        // Weights come straight from config, so clamp instead of overflowing.
        let mut score = 0i64;
        if report.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score = score.saturating_add(self.discrete_bonus);
        }
        score = score.saturating_add(
            (f64::from(report.max_image_dimension_2d)
                * f64::from(self.image_dimension_weight)) as i64,
        );
        if report.queue_families.is_ideal() {
            score = score.saturating_add(self.ideal_queue_bonus);
        }
        score
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCandidate {
    pub score: i64,
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub vendor_id: u32,
    pub device_id: u32,
    pub api_version: VkVersion,
    /// Vendor specific encoding.
    pub driver_version: u32,
    pub queue_families: QueueFamilyIndices,
}

/// Rates one physical device against `criteria` for presenting to
/// `surface`.
///
/// Swapchain support is queried for devices that score above zero and only
/// logged. A failure there is a warning, not an error, since it never feeds
/// into the score.
pub fn rate_device_suitability<D: Driver + ?Sized>(
    driver: &D,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    criteria: &SelectionCriteria,
) -> Result<DeviceCandidate, SelectionError> {
    use SelectionError as Error;

    let properties = driver
        .device_properties(physical_device)
        .map_err(Error::Driver)?;
    let features = driver
        .device_features(physical_device)
        .map_err(Error::Driver)?;
    let families = driver
        .queue_families(physical_device)
        .map_err(Error::Driver)?;
    let queue_families = resolve_queue_families(&families, |index| {
        driver.surface_support(physical_device, index, surface)
    })
    .map_err(Error::Driver)?;
    let extensions = driver
        .device_extensions(physical_device)
        .map_err(Error::Driver)?;

    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed device>".to_owned());
    let _span = tracing::trace_span!("rate_device", %name).entered();
    log_catalog("device extensions", &extensions);

    let report = DeviceReport {
        device_type: properties.device_type,
        max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        geometry_shader: features.geometry_shader == vk::TRUE,
        queue_families,
        missing_extensions: extensions
            .missing(&criteria.required_extensions)
            .into_iter()
            .map(str::to_owned)
            .collect(),
    };
    let score = criteria.score(&report);

    if score > 0 {
        // Gathered for later swapchain setup. Not scored.
        match SwapchainSupportDetails::query(driver, physical_device, surface) {
            Ok(details) => tracing::debug!(
                "'{}' offers {} surface formats and {} present modes",
                name,
                details.formats.len(),
                details.present_modes.len()
            ),
            Err(e) => {
                tracing::warn!("Could not query swapchain support for '{name}': {e}")
            }
        }
    }

    Ok(DeviceCandidate {
        score,
        physical_device,
        name,
        device_type: properties.device_type,
        vendor_id: properties.vendor_id,
        device_id: properties.device_id,
        api_version: VkVersion::from_raw(properties.api_version),
        driver_version: properties.driver_version,
        queue_families,
    })
}

/// Groups candidates by score, lowest first.
///
/// Within one score candidates keep the order they were passed in.
pub fn rank_candidates(
    candidates: Vec<DeviceCandidate>,
) -> BTreeMap<i64, Vec<DeviceCandidate>> {
    let mut ranking: BTreeMap<i64, Vec<DeviceCandidate>> = BTreeMap::new();
    for candidate in candidates {
        ranking.entry(candidate.score).or_default().push(candidate);
    }
    ranking
}

/// Picks the highest scoring candidate, the earliest one on a tie.
pub fn pick_best(
    candidates: Vec<DeviceCandidate>,
) -> Result<DeviceCandidate, SelectionError> {
    let ranking = rank_candidates(candidates);

    tracing::debug!("Physical device ranking:");
    for (score, candidates) in ranking.iter().rev() {
        for candidate in candidates {
            tracing::debug!(
                "\t{:>8} '{}' ({:?}) vendor_id={:#06x} device_id={:#06x} api_ver={} driver_ver={:#x}",
                score,
                candidate.name,
                candidate.device_type,
                candidate.vendor_id,
                candidate.device_id,
                candidate.api_version,
                candidate.driver_version
            );
        }
    }

    ranking
        .into_iter()
        .next_back()
        .filter(|(score, _)| *score > 0)
        .and_then(|(_, candidates)| candidates.into_iter().next())
        .ok_or(SelectionError::NoSuitableDevice)
}

/// Chooses the best physical device for the surface in `state`.
///
/// On success the device and its queue families are written into `state`.
pub fn select_physical_device<D: Driver + ?Sized>(
    driver: &mut D,
    state: &mut RuntimeState,
    criteria: &SelectionCriteria,
) -> Result<DeviceCandidate, SelectionError> {
    let _span = tracing::debug_span!("select_physical_device").entered();

    let instance = state.instance.ok_or(SelectionError::NoInstance)?;
    let surface = state.surface.ok_or(SelectionError::NoSurface)?;

    let devices = driver
        .physical_devices(instance)
        .map_err(SelectionError::Driver)?;
    if devices.is_empty() {
        tracing::error!("Failed to find GPUs with Vulkan support!");
        return Err(SelectionError::NoDevices);
    }

    let candidates = devices
        .iter()
        .map(|&pd| rate_device_suitability(&*driver, pd, surface, criteria))
        .collect::<Result<Vec<_>, _>>()?;

    let best = pick_best(candidates).inspect_err(|_| {
        tracing::error!("Failed to find a suitable GPU!");
    })?;

    tracing::info!(
        "Selected physical device '{}' ({:?}) with score {}",
        best.name,
        best.device_type,
        best.score
    );
    state.physical_device = Some(best.physical_device);
    state.queue_families = Some(best.queue_families);
    Ok(best)
}
