//! [`Driver`] implementation over `ash` and `ash-window`.
//!
//! [`AshDriver`] owns the `ash::Entry` loader and the `ash` wrapper objects
//! for the one instance and one logical device it creates. Raw handles passed
//! back in through the [`Driver`] trait are checked against the handles this
//! driver created or enumerated before any driver call is made, so the
//! pipeline never hands Vulkan a handle from somewhere else.

use std::ffi::{CStr, c_char};

use ash::{prelude::VkResult, vk};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use thiserror::Error;

use crate::catalog::CapabilitySet;
use crate::driver::{DeviceRequest, Driver, InstanceRequest};

#[derive(Debug, Error)]
pub enum DriverLoadError {
    #[error("Could not load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),
}

pub struct AshDriver {
    entry: ash::Entry,
    instance: Option<ash::Instance>,
    surface_instance: Option<ash::khr::surface::Instance>,
    physical_devices: Vec<vk::PhysicalDevice>,
    surfaces: Vec<vk::SurfaceKHR>,
    device: Option<ash::Device>,
}

impl std::fmt::Debug for AshDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AshDriver")
            .field("instance", &self.instance.as_ref().map(|i| i.handle()))
            .field("device", &self.device.as_ref().map(|d| d.handle()))
            .field("surfaces", &self.surfaces)
            .finish_non_exhaustive()
    }
}

impl Drop for AshDriver {
    fn drop(&mut self) {
        if let Some(ref device) = self.device {
            tracing::warn!(
                "AshDriver dropped while device {:?} is still alive; \
                 it will leak",
                device.handle()
            );
        }
        if let Some(ref instance) = self.instance {
            tracing::warn!(
                "AshDriver dropped while instance {:?} is still alive; \
                 it will leak",
                instance.handle()
            );
        }
    }
}

impl AshDriver {
    /// Loads the Vulkan library.
    ///
    /// # Safety
    /// This loads vulkan using libloading, meaning that there can be
    /// arbitrary code executed. Every handle created through this driver
    /// must be destroyed through it before it is dropped.
    pub unsafe fn load() -> Result<Self, DriverLoadError> {
        //SAFETY: We pass on the burden of the safety from loading dlls to the
        //caller.
        let entry = unsafe { ash::Entry::load() }?;
        Ok(Self::from_entry(entry))
    }

    pub fn from_entry(entry: ash::Entry) -> Self {
        Self {
            entry,
            instance: None,
            surface_instance: None,
            physical_devices: Vec::new(),
            surfaces: Vec::new(),
            device: None,
        }
    }

    fn checked_instance(&self, instance: vk::Instance) -> VkResult<&ash::Instance> {
        match self.instance {
            Some(ref ash_instance) if ash_instance.handle() == instance => {
                Ok(ash_instance)
            }
            _ => {
                tracing::error!(
                    "Instance {:?} was not created by this driver",
                    instance
                );
                Err(vk::Result::ERROR_INITIALIZATION_FAILED)
            }
        }
    }

    fn checked_physical_device(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<&ash::Instance> {
        let Some(ref ash_instance) = self.instance else {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        };
        if self.physical_devices.contains(&physical_device) {
            Ok(ash_instance)
        } else {
            tracing::error!(
                "Physical device {:?} was not enumerated by this driver",
                physical_device
            );
            Err(vk::Result::ERROR_INITIALIZATION_FAILED)
        }
    }

    fn checked_surface(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<&ash::khr::surface::Instance> {
        self.checked_physical_device(physical_device)?;
        let Some(ref surface_instance) = self.surface_instance else {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        };
        if self.surfaces.contains(&surface) {
            Ok(surface_instance)
        } else {
            tracing::error!("Surface {:?} was not created by this driver", surface);
            Err(vk::Result::ERROR_SURFACE_LOST_KHR)
        }
    }

    fn checked_device(&self, device: vk::Device) -> VkResult<&ash::Device> {
        match self.device {
            Some(ref ash_device) if ash_device.handle() == device => Ok(ash_device),
            _ => {
                tracing::error!("Device {:?} was not created by this driver", device);
                Err(vk::Result::ERROR_DEVICE_LOST)
            }
        }
    }
}

impl Driver for AshDriver {
    fn instance_extensions(&self) -> VkResult<CapabilitySet> {
        // SAFETY: entry is a live Vulkan entry; passing None queries
        // global extensions and does not dereference any layer name.
        let props = unsafe { self.entry.enumerate_instance_extension_properties(None) }?;
        Ok(CapabilitySet::from_extension_properties(&props))
    }

    fn instance_layers(&self) -> VkResult<CapabilitySet> {
        // SAFETY: entry is a live Vulkan entry;
        // vkEnumerateInstanceLayerProperties has no additional preconditions.
        let props = unsafe { self.entry.enumerate_instance_layer_properties() }?;
        Ok(CapabilitySet::from_layer_properties(&props))
    }

    fn create_instance(
        &mut self,
        request: &InstanceRequest<'_>,
    ) -> VkResult<vk::Instance> {
        if let Some(ref existing) = self.instance {
            tracing::error!(
                "AshDriver already owns instance {:?}",
                existing.handle()
            );
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }

        let ext_ptrs: Vec<*const c_char> =
            request.extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> =
            request.layers.iter().map(|layer| layer.as_ptr()).collect();

        let app_info = vk::ApplicationInfo::default()
            .application_name(request.application_name)
            .application_version(request.application_version)
            .engine_name(request.engine_name)
            .engine_version(request.engine_version)
            .api_version(request.api_version);

        let mut debug_messenger_create_info = request.debug_messenger;

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .flags(request.flags);

        if let Some(ref mut debug_info) = debug_messenger_create_info {
            //The messenger info has to be the tail of the chain
            debug_info.p_next = std::ptr::null();
            instance_create_info = instance_create_info.push_next(debug_info);
        }

        //SAFETY: We made a valid instance_create_info. Every pointer in it
        //borrows from locals or from request, all of which outlive the call
        let instance =
            unsafe { self.entry.create_instance(&instance_create_info, None) }?;

        let surface_ext_loaded = request
            .extensions
            .iter()
            .any(|ext| ext.as_c_str() == ash::khr::surface::NAME);
        self.surface_instance = surface_ext_loaded
            .then(|| ash::khr::surface::Instance::new(&self.entry, &instance));

        let handle = instance.handle();
        self.instance = Some(instance);
        Ok(handle)
    }

    fn instance_proc_addr(
        &self,
        instance: vk::Instance,
        name: &CStr,
    ) -> vk::PFN_vkVoidFunction {
        self.checked_instance(instance).ok()?;
        //SAFETY: instance was created from this entry and has not been
        //destroyed; name is NUL terminated
        unsafe { self.entry.get_instance_proc_addr(instance, name.as_ptr()) }
    }

    fn create_surface(
        &mut self,
        instance: vk::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        let ash_instance = self.checked_instance(instance)?;
        if self.surface_instance.is_none() {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        //SAFETY: ash_instance is alive and was created with the surface
        //extension enabled. The caller keeps the window alive until the
        //surface is destroyed through destroy_surface
        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                ash_instance,
                display,
                window,
                None,
            )
        }?;
        self.surfaces.push(surface);
        Ok(surface)
    }

    fn physical_devices(
        &mut self,
        instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>> {
        let ash_instance = self.checked_instance(instance)?;
        //SAFETY: ash_instance is alive
        let devices = unsafe { ash_instance.enumerate_physical_devices() }?;
        self.physical_devices = devices.clone();
        Ok(devices)
    }

    fn device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties> {
        let ash_instance = self.checked_physical_device(physical_device)?;
        //SAFETY: physical_device was enumerated from this instance
        Ok(unsafe { ash_instance.get_physical_device_properties(physical_device) })
    }

    fn device_features(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceFeatures> {
        let ash_instance = self.checked_physical_device(physical_device)?;
        //SAFETY: physical_device was enumerated from this instance
        Ok(unsafe { ash_instance.get_physical_device_features(physical_device) })
    }

    fn queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        let ash_instance = self.checked_physical_device(physical_device)?;
        //SAFETY: physical_device was enumerated from this instance
        Ok(unsafe {
            ash_instance.get_physical_device_queue_family_properties(physical_device)
        })
    }

    fn device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<CapabilitySet> {
        let ash_instance = self.checked_physical_device(physical_device)?;
        //SAFETY: physical_device was enumerated from this instance
        let props = unsafe {
            ash_instance.enumerate_device_extension_properties(physical_device)
        }?;
        Ok(CapabilitySet::from_extension_properties(&props))
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        let surface_instance = self.checked_surface(physical_device, surface)?;
        //SAFETY: physical_device and surface were both derived from this
        //instance
        unsafe {
            surface_instance.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                surface,
            )
        }
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let surface_instance = self.checked_surface(physical_device, surface)?;
        //SAFETY: physical_device and surface were both derived from this
        //instance
        unsafe {
            surface_instance
                .get_physical_device_surface_capabilities(physical_device, surface)
        }
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        let surface_instance = self.checked_surface(physical_device, surface)?;
        //SAFETY: physical_device and surface were both derived from this
        //instance
        unsafe {
            surface_instance.get_physical_device_surface_formats(physical_device, surface)
        }
    }

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        let surface_instance = self.checked_surface(physical_device, surface)?;
        //SAFETY: physical_device and surface were both derived from this
        //instance
        unsafe {
            surface_instance
                .get_physical_device_surface_present_modes(physical_device, surface)
        }
    }

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        request: &DeviceRequest<'_>,
    ) -> VkResult<vk::Device> {
        let ash_instance = self.checked_physical_device(physical_device)?;
        if let Some(ref existing) = self.device {
            tracing::error!("AshDriver already owns device {:?}", existing.handle());
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo<'_>> = request
            .queues
            .iter()
            .map(|queue| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(queue.family_index)
                    .queue_priorities(std::slice::from_ref(&queue.priority))
            })
            .collect();
        let ext_ptrs: Vec<*const c_char> =
            request.extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> =
            request.layers.iter().map(|layer| layer.as_ptr()).collect();

        #[allow(deprecated)]
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&request.features);

        //SAFETY: physical_device was enumerated from this instance,
        //device_create_info is valid and only borrows locals and request
        let device = unsafe {
            ash_instance.create_device(physical_device, &device_create_info, None)
        }?;
        let handle = device.handle();
        self.device = Some(device);
        Ok(handle)
    }

    fn device_queue(
        &self,
        device: vk::Device,
        family_index: u32,
        queue_index: u32,
    ) -> VkResult<vk::Queue> {
        let ash_device = self.checked_device(device)?;
        //SAFETY: device is alive; the caller requested this family/index at
        //device creation
        Ok(unsafe { ash_device.get_device_queue(family_index, queue_index) })
    }

    fn destroy_device(&mut self, device: vk::Device) {
        match self.device.take() {
            Some(ash_device) if ash_device.handle() == device => {
                tracing::debug!("Destroying device {:?}", device);
                //SAFETY: This is the last use of the device. The caller
                //destroys every child object first
                unsafe { ash_device.destroy_device(None) };
            }
            other => {
                tracing::error!(
                    "Refusing to destroy device {:?} not owned by this driver",
                    device
                );
                self.device = other;
            }
        }
    }

    fn destroy_surface(&mut self, instance: vk::Instance, surface: vk::SurfaceKHR) {
        if self.checked_instance(instance).is_err() {
            return;
        }
        let Some(position) = self.surfaces.iter().position(|s| *s == surface) else {
            tracing::error!(
                "Refusing to destroy surface {:?} not owned by this driver",
                surface
            );
            return;
        };
        if let Some(ref surface_instance) = self.surface_instance {
            tracing::debug!("Destroying surface {:?}", surface);
            // SAFETY: surface is derived from this instance and the caller
            // destroyed the device that presented to it
            unsafe { surface_instance.destroy_surface(surface, None) };
            self.surfaces.swap_remove(position);
        }
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        match self.instance.take() {
            Some(ash_instance) if ash_instance.handle() == instance => {
                if !self.surfaces.is_empty() {
                    tracing::warn!(
                        "Destroying instance with {} live surface(s)",
                        self.surfaces.len()
                    );
                }
                self.surface_instance = None;
                self.physical_devices.clear();
                self.surfaces.clear();
                tracing::debug!("Destroying instance {:?}", instance);
                //SAFETY: This is the last use of the instance. Any given
                //derived object should be gone
                unsafe { ash_instance.destroy_instance(None) };
            }
            other => {
                tracing::error!(
                    "Refusing to destroy instance {:?} not owned by this driver",
                    instance
                );
                self.instance = other;
            }
        }
    }
}
