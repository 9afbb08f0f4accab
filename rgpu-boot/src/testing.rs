//! Scripted stand-ins for the driver and the window system.
//!
//! Handles are plain integers wrapped with `Handle::from_raw`; nothing here
//! talks to a real Vulkan implementation. Destruction is recorded in a
//! thread local log so the debug messenger's `extern "system"` destroy
//! function can report into the same place as [`FakeDriver`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::{CStr, CString};

use ash::{
    prelude::VkResult,
    vk::{self, Handle},
};
use raw_window_handle::{
    HandleError, RawDisplayHandle, RawWindowHandle, XlibDisplayHandle,
    XlibWindowHandle,
};

use crate::catalog::CapabilitySet;
use crate::debug::{CREATE_DEBUG_MESSENGER_FN, DESTROY_DEBUG_MESSENGER_FN};
use crate::driver::{DeviceRequest, Driver, InstanceRequest, QueueRequest};
use crate::instance::{
    DEBUG_UTILS_EXTENSION, KHRONOS_VALIDATION_LAYER,
    PORTABILITY_ENUMERATION_EXTENSION,
};
use crate::select::SWAPCHAIN_EXTENSION;
use crate::surface::{WindowError, WindowSystem};

pub(crate) fn fake_instance() -> vk::Instance {
    vk::Instance::from_raw(0x1)
}

pub(crate) fn fake_surface() -> vk::SurfaceKHR {
    vk::SurfaceKHR::from_raw(0x2)
}

pub(crate) fn fake_messenger() -> vk::DebugUtilsMessengerEXT {
    vk::DebugUtilsMessengerEXT::from_raw(0x3)
}

pub(crate) fn fake_device() -> vk::Device {
    vk::Device::from_raw(0x4)
}

pub(crate) fn fake_physical_device(index: usize) -> vk::PhysicalDevice {
    vk::PhysicalDevice::from_raw(0x100 + index as u64)
}

pub(crate) fn fake_queue(family: u32) -> vk::Queue {
    vk::Queue::from_raw(0x200 + u64::from(family))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    Device(vk::Device),
    DebugMessenger(vk::DebugUtilsMessengerEXT),
    Surface(vk::SurfaceKHR),
    Instance(vk::Instance),
}

thread_local! {
    static TEARDOWN_LOG: RefCell<Vec<Teardown>> = const { RefCell::new(Vec::new()) };
}

fn record_teardown(event: Teardown) {
    TEARDOWN_LOG.with_borrow_mut(|log| log.push(event));
}

/// Drains everything destroyed on this thread so far.
pub(crate) fn teardown_log() -> Vec<Teardown> {
    TEARDOWN_LOG.with_borrow_mut(std::mem::take)
}

pub(crate) fn clear_teardown_log() {
    TEARDOWN_LOG.with_borrow_mut(Vec::clear);
}

unsafe extern "system" fn fake_create_debug_messenger(
    _instance: vk::Instance,
    _create_info: *const vk::DebugUtilsMessengerCreateInfoEXT<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    messenger: *mut vk::DebugUtilsMessengerEXT,
) -> vk::Result {
    //SAFETY: the caller hands us a writable handle location
    unsafe { messenger.write(fake_messenger()) };
    vk::Result::SUCCESS
}

unsafe extern "system" fn failing_create_debug_messenger(
    _instance: vk::Instance,
    _create_info: *const vk::DebugUtilsMessengerCreateInfoEXT<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    _messenger: *mut vk::DebugUtilsMessengerEXT,
) -> vk::Result {
    vk::Result::ERROR_OUT_OF_HOST_MEMORY
}

unsafe extern "system" fn fake_destroy_debug_messenger(
    _instance: vk::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    record_teardown(Teardown::DebugMessenger(messenger));
}

/// One fake physical device.
#[derive(Debug, Clone)]
pub(crate) struct FakeDevice {
    pub name: &'static str,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub geometry_shader: bool,
    /// Queue family flags and whether the family can present.
    pub families: Vec<(vk::QueueFlags, bool)>,
    pub extensions: Vec<String>,
}

impl FakeDevice {
    pub fn discrete(max_image_dimension_2d: u32) -> Self {
        Self {
            name: "Fake Discrete GPU",
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            max_image_dimension_2d,
            geometry_shader: true,
            families: vec![(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true)],
            extensions: vec![SWAPCHAIN_EXTENSION.to_owned()],
        }
    }

    pub fn integrated(max_image_dimension_2d: u32) -> Self {
        Self {
            name: "Fake Integrated GPU",
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..Self::discrete(max_image_dimension_2d)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedInstanceRequest {
    pub extensions: Vec<String>,
    pub layers: Vec<String>,
    pub flags: vk::InstanceCreateFlags,
    pub debug_messenger_chained: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedDeviceRequest {
    pub physical_device: vk::PhysicalDevice,
    pub queues: Vec<QueueRequest>,
    pub extensions: Vec<String>,
    pub layers: Vec<String>,
}

fn lossy_names(names: &[CString]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// A [`Driver`] whose answers are scripted by the test.
#[derive(Debug)]
pub(crate) struct FakeDriver {
    pub instance_extensions: Vec<String>,
    pub instance_layers: Vec<String>,
    /// Popped per `create_instance` call; success once empty.
    pub instance_results: VecDeque<VkResult<vk::Instance>>,
    pub instance_requests: Vec<RecordedInstanceRequest>,
    /// Which debug utils functions `instance_proc_addr` resolves.
    pub exported_fns: Vec<&'static CStr>,
    /// The resolved create function fails with out of host memory.
    pub messenger_creation_fails: bool,
    pub surface_result: VkResult<vk::SurfaceKHR>,
    pub devices: Vec<FakeDevice>,
    /// Failure to report from `create_device`.
    pub device_result: Option<vk::Result>,
    pub device_requests: Vec<RecordedDeviceRequest>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        clear_teardown_log();
        Self {
            instance_extensions: vec![
                "VK_KHR_surface".to_owned(),
                "VK_KHR_xlib_surface".to_owned(),
                DEBUG_UTILS_EXTENSION.to_owned(),
                PORTABILITY_ENUMERATION_EXTENSION.to_owned(),
            ],
            instance_layers: vec![KHRONOS_VALIDATION_LAYER.to_owned()],
            instance_results: VecDeque::new(),
            instance_requests: Vec::new(),
            exported_fns: vec![CREATE_DEBUG_MESSENGER_FN, DESTROY_DEBUG_MESSENGER_FN],
            messenger_creation_fails: false,
            surface_result: Ok(fake_surface()),
            devices: Vec::new(),
            device_result: None,
            device_requests: Vec::new(),
        }
    }
}

impl FakeDriver {
    fn device(&self, physical_device: vk::PhysicalDevice) -> VkResult<&FakeDevice> {
        physical_device
            .as_raw()
            .checked_sub(fake_physical_device(0).as_raw())
            .and_then(|index| self.devices.get(index as usize))
            .ok_or(vk::Result::ERROR_DEVICE_LOST)
    }
}

impl Driver for FakeDriver {
    fn instance_extensions(&self) -> VkResult<CapabilitySet> {
        Ok(CapabilitySet::new(self.instance_extensions.iter().cloned()))
    }

    fn instance_layers(&self) -> VkResult<CapabilitySet> {
        Ok(CapabilitySet::new(self.instance_layers.iter().cloned()))
    }

    fn create_instance(
        &mut self,
        request: &InstanceRequest<'_>,
    ) -> VkResult<vk::Instance> {
        self.instance_requests.push(RecordedInstanceRequest {
            extensions: lossy_names(request.extensions),
            layers: lossy_names(request.layers),
            flags: request.flags,
            debug_messenger_chained: request.debug_messenger.is_some(),
        });
        self.instance_results
            .pop_front()
            .unwrap_or(Ok(fake_instance()))
    }

    fn instance_proc_addr(
        &self,
        instance: vk::Instance,
        name: &CStr,
    ) -> vk::PFN_vkVoidFunction {
        if instance != fake_instance() || !self.exported_fns.iter().any(|f| *f == name) {
            return None;
        }
        let create: vk::PFN_vkCreateDebugUtilsMessengerEXT = if self.messenger_creation_fails {
            failing_create_debug_messenger
        } else {
            fake_create_debug_messenger
        };
        let destroy: vk::PFN_vkDestroyDebugUtilsMessengerEXT = fake_destroy_debug_messenger;

        if name == CREATE_DEBUG_MESSENGER_FN {
            //SAFETY: only ever transmuted back to its real type by the
            //debug module
            Some(unsafe {
                std::mem::transmute::<
                    vk::PFN_vkCreateDebugUtilsMessengerEXT,
                    unsafe extern "system" fn(),
                >(create)
            })
        } else if name == DESTROY_DEBUG_MESSENGER_FN {
            //SAFETY: only ever transmuted back to its real type by the
            //debug module
            Some(unsafe {
                std::mem::transmute::<
                    vk::PFN_vkDestroyDebugUtilsMessengerEXT,
                    unsafe extern "system" fn(),
                >(destroy)
            })
        } else {
            None
        }
    }

    fn create_surface(
        &mut self,
        _instance: vk::Instance,
        _display: RawDisplayHandle,
        _window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        self.surface_result
    }

    fn physical_devices(
        &mut self,
        _instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>> {
        Ok((0..self.devices.len()).map(fake_physical_device).collect())
    }

    fn device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties> {
        let device = self.device(physical_device)?;
        let mut properties = vk::PhysicalDeviceProperties {
            api_version: vk::API_VERSION_1_3,
            vendor_id: 0x10de,
            device_type: device.device_type,
            limits: vk::PhysicalDeviceLimits {
                max_image_dimension2_d: device.max_image_dimension_2d,
                ..Default::default()
            },
            ..Default::default()
        };
        for (dst, src) in properties.device_name.iter_mut().zip(device.name.bytes()) {
            *dst = src as std::ffi::c_char;
        }
        Ok(properties)
    }

    fn device_features(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceFeatures> {
        let device = self.device(physical_device)?;
        Ok(vk::PhysicalDeviceFeatures {
            geometry_shader: vk::Bool32::from(device.geometry_shader),
            ..Default::default()
        })
    }

    fn queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        Ok(self
            .device(physical_device)?
            .families
            .iter()
            .map(|&(queue_flags, _)| vk::QueueFamilyProperties {
                queue_flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect())
    }

    fn device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<CapabilitySet> {
        Ok(CapabilitySet::new(
            self.device(physical_device)?.extensions.iter().cloned(),
        ))
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        self.device(physical_device)?
            .families
            .get(queue_family_index as usize)
            .map(|&(_, presents)| presents)
            .ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        self.device(physical_device)?;
        Ok(vk::SurfaceCapabilitiesKHR::default())
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        self.device(physical_device)?;
        Ok(vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }])
    }

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        self.device(physical_device)?;
        Ok(vec![vk::PresentModeKHR::FIFO])
    }

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        request: &DeviceRequest<'_>,
    ) -> VkResult<vk::Device> {
        self.device_requests.push(RecordedDeviceRequest {
            physical_device,
            queues: request.queues.to_vec(),
            extensions: lossy_names(request.extensions),
            layers: lossy_names(request.layers),
        });
        match self.device_result {
            Some(err) => Err(err),
            None => Ok(fake_device()),
        }
    }

    fn device_queue(
        &self,
        _device: vk::Device,
        family_index: u32,
        _queue_index: u32,
    ) -> VkResult<vk::Queue> {
        Ok(fake_queue(family_index))
    }

    fn destroy_device(&mut self, device: vk::Device) {
        record_teardown(Teardown::Device(device));
    }

    fn destroy_surface(&mut self, _instance: vk::Instance, surface: vk::SurfaceKHR) {
        record_teardown(Teardown::Surface(surface));
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        record_teardown(Teardown::Instance(instance));
    }
}

/// A window that reports Xlib handles and a fixed extension list.
#[derive(Debug, Clone)]
pub(crate) struct FakeWindow {
    pub extensions: Vec<String>,
    pub handles_available: bool,
}

impl Default for FakeWindow {
    fn default() -> Self {
        Self {
            extensions: vec!["VK_KHR_surface".to_owned(), "VK_KHR_xlib_surface".to_owned()],
            handles_available: true,
        }
    }
}

impl WindowSystem for FakeWindow {
    fn required_instance_extensions(&self) -> Result<Vec<String>, WindowError> {
        Ok(self.extensions.clone())
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), WindowError> {
        if !self.handles_available {
            return Err(WindowError::InvalidWindowHandle(HandleError::Unavailable));
        }
        Ok((
            RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
            RawWindowHandle::Xlib(XlibWindowHandle::new(1)),
        ))
    }
}
