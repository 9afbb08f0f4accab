//! Driver-reported capability catalogs.
//!
//! A [`CapabilitySet`] is a snapshot of the extension or layer names the
//! driver reports for one scope (the instance, or a single physical device).
//! Snapshots are taken fresh on every query and never cached.

use ash::{prelude::VkResult, vk};

use crate::driver::Driver;

/// Ordered list of names reported by the driver for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    names: Vec<String>,
}

impl CapabilitySet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_extension_properties(props: &[vk::ExtensionProperties]) -> Self {
        Self::new(props.iter().filter_map(|p| {
            p.extension_name_as_c_str()
                .ok()
                .map(|name| name.to_string_lossy().into_owned())
        }))
    }

    pub fn from_layer_properties(props: &[vk::LayerProperties]) -> Self {
        Self::new(props.iter().filter_map(|p| {
            p.layer_name_as_c_str()
                .ok()
                .map(|name| name.to_string_lossy().into_owned())
        }))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Names from `required` that this set does not contain, in the order
    /// they were required.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| !self.contains(name))
            .map(String::as_str)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Surface capabilities of a physical device.
///
/// Gathered during device scoring. Nothing in the score depends on these
/// yet.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query<D: Driver + ?Sized>(
        driver: &D,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Self> {
        Ok(Self {
            capabilities: driver
                .surface_capabilities(physical_device, surface)?,
            formats: driver.surface_formats(physical_device, surface)?,
            present_modes: driver
                .surface_present_modes(physical_device, surface)?,
        })
    }
}

pub(crate) fn log_catalog(scope: &str, set: &CapabilitySet) {
    tracing::trace!("All [{}] available {}:", set.len(), scope);
    for name in set.iter() {
        tracing::trace!("\t{}", name);
    }
}
