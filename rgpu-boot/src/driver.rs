//! The seam between the bootstrap pipeline and the Vulkan driver.
//!
//! Every driver call the pipeline makes goes through [`Driver`]. Handles
//! cross the seam as raw `ash::vk` handles; the implementation owns whatever
//! loader state it needs to dispatch them.
//! [`AshDriver`](crate::ash_driver::AshDriver) is the real implementation.

use std::ffi::{CStr, CString};

use ash::{prelude::VkResult, vk};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::catalog::CapabilitySet;

/// Everything needed to build a `VkInstanceCreateInfo`.
#[derive(Debug, Clone)]
pub struct InstanceRequest<'a> {
    pub application_name: &'a CStr,
    pub application_version: u32,
    pub engine_name: &'a CStr,
    pub engine_version: u32,
    pub api_version: u32,
    pub extensions: &'a [CString],
    pub layers: &'a [CString],
    pub flags: vk::InstanceCreateFlags,
    /// Chained into the instance create info so messages emitted during
    /// `vkCreateInstance` itself are reported.
    pub debug_messenger: Option<vk::DebugUtilsMessengerCreateInfoEXT<'static>>,
}

/// One queue from one family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueRequest {
    pub family_index: u32,
    /// In `0.0..=1.0`.
    pub priority: f32,
}

/// Everything needed to build a `VkDeviceCreateInfo`.
#[derive(Debug, Clone)]
pub struct DeviceRequest<'a> {
    pub queues: &'a [QueueRequest],
    pub extensions: &'a [CString],
    /// Device layers are deprecated; older loaders still read them.
    pub layers: &'a [CString],
    pub features: vk::PhysicalDeviceFeatures,
}

pub trait Driver {
    fn instance_extensions(&self) -> VkResult<CapabilitySet>;

    fn instance_layers(&self) -> VkResult<CapabilitySet>;

    fn create_instance(
        &mut self,
        request: &InstanceRequest<'_>,
    ) -> VkResult<vk::Instance>;

    /// `vkGetInstanceProcAddr`. `None` when the driver does not export
    /// `name` for `instance`.
    fn instance_proc_addr(
        &self,
        instance: vk::Instance,
        name: &CStr,
    ) -> vk::PFN_vkVoidFunction;

    fn create_surface(
        &mut self,
        instance: vk::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR>;

    fn physical_devices(
        &mut self,
        instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>>;

    fn device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties>;

    fn device_features(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceFeatures>;

    fn queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>>;

    fn device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<CapabilitySet>;

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        request: &DeviceRequest<'_>,
    ) -> VkResult<vk::Device>;

    fn device_queue(
        &self,
        device: vk::Device,
        family_index: u32,
        queue_index: u32,
    ) -> VkResult<vk::Queue>;

    fn destroy_device(&mut self, device: vk::Device);

    fn destroy_surface(&mut self, instance: vk::Instance, surface: vk::SurfaceKHR);

    fn destroy_instance(&mut self, instance: vk::Instance);
}

/// Convert a list of names into the NUL terminated form the driver wants.
///
/// Returns the first name containing an interior NUL on failure.
pub fn to_cstrings(names: &[String]) -> Result<Vec<CString>, String> {
    names
        .iter()
        .map(|name| CString::new(name.as_str()).map_err(|_| name.clone()))
        .collect()
}
