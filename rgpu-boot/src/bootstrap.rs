use thiserror::Error;

use crate::ash_driver::DriverLoadError;
use crate::config::{BootstrapConfig, ConfigError};
use crate::debug::{DebugError, setup_debug_channel};
use crate::device::{DeviceError, LogicalDeviceRequest, create_logical_device};
use crate::driver::Driver;
use crate::instance::{InstanceError, create_instance};
use crate::select::{SelectionError, select_physical_device};
use crate::state::{CleanupError, RuntimeState};
use crate::surface::{SurfaceError, WindowSystem, create_surface};

/// Who has to act on a [`BootstrapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fix the request (config or names passed in).
    Request,
    /// The driver, hardware, or window system can't do what was asked.
    Environment,
    /// A stage ran before the stage it depends on.
    Ordering,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    DriverLoad(#[from] DriverLoadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Instance(#[from] InstanceError),
    #[error(transparent)]
    Debug(#[from] DebugError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Cleanup(#[from] CleanupError),
}

impl BootstrapError {
    pub fn category(&self) -> ErrorCategory {
        use ErrorCategory::*;
        match self {
            BootstrapError::DriverLoad(_) => Environment,
            BootstrapError::Config(_) => Request,
            BootstrapError::Instance(e) => match e {
                InstanceError::NoWindowSystem | InstanceError::InvalidName(_) => {
                    Request
                }
                InstanceError::Enumerate(_)
                | InstanceError::Window(_)
                | InstanceError::IncompatibleDriver
                | InstanceError::Creation(_) => Environment,
            },
            BootstrapError::Debug(e) => match e {
                DebugError::InstanceNotInitialized | DebugError::AlreadyInstalled => {
                    Ordering
                }
                DebugError::FunctionNotResolvable(_) | DebugError::Creation(_) => {
                    Environment
                }
            },
            BootstrapError::Surface(e) => match e {
                SurfaceError::InstanceNotInitialized | SurfaceError::AlreadyCreated => {
                    Ordering
                }
                SurfaceError::Window(_) | SurfaceError::Creation(_) => Environment,
            },
            BootstrapError::Selection(e) => match e {
                SelectionError::NoInstance | SelectionError::NoSurface => Ordering,
                // No device meets the criteria the caller asked for.
                SelectionError::NoSuitableDevice => Request,
                SelectionError::NoDevices | SelectionError::Driver(_) => Environment,
            },
            BootstrapError::Device(e) => match e {
                DeviceError::NoPhysicalDevice
                | DeviceError::IncompleteQueues(_)
                | DeviceError::AlreadyCreated => Ordering,
                DeviceError::InvalidName(_) => Request,
                DeviceError::Creation(_) | DeviceError::Queue(_) => Environment,
            },
            BootstrapError::Cleanup(_) => Ordering,
        }
    }
}

/// Runs the whole bootstrap: instance, debug messenger, surface, physical
/// device, logical device.
///
/// `config`'s requested extension and layer lists are rewritten to what was
/// actually enabled. On failure `state` holds whatever was created before
/// the failing stage; pass it to [`cleanup`](crate::state::cleanup) either
/// way.
pub fn init<D: Driver + ?Sized>(
    driver: &mut D,
    window: &dyn WindowSystem,
    config: &mut BootstrapConfig,
    state: &mut RuntimeState,
) -> Result<(), BootstrapError> {
    let _span = tracing::info_span!("bootstrap").entered();

    let created = create_instance(
        driver,
        Some(window),
        &mut config.instance,
        config.debug_messenger.as_ref(),
    )?;
    state.instance = Some(created.handle);

    if config.instance.enable_validation
        && created.debug_utils_enabled
        && let Some(debug_messenger) = &config.debug_messenger
    {
        setup_debug_channel(&*driver, state, debug_messenger)?;
    }

    create_surface(driver, state, window)?;

    let selected = select_physical_device(driver, state, &config.selection)?;

    let request = LogicalDeviceRequest::new(
        &selected.queue_families,
        &config.device,
        &config.selection,
        &config.instance,
    );
    create_logical_device(driver, state, &request)?;

    tracing::info!("Vulkan bootstrap complete on '{}'", selected.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::*;
    use crate::instance::KHRONOS_VALIDATION_LAYER;
    use crate::state::cleanup;
    use crate::testing::{
        FakeDevice, FakeDriver, FakeWindow, Teardown, fake_device, fake_instance,
        fake_messenger, fake_physical_device, fake_queue, fake_surface,
        teardown_log,
    };

    fn validating_config() -> BootstrapConfig {
        let mut config = BootstrapConfig::default();
        config.instance.enable_validation = true;
        config
    }

    #[test]
    fn full_bootstrap_then_cleanup() {
        let mut driver = FakeDriver {
            devices: vec![FakeDevice::integrated(4096), FakeDevice::discrete(8192)],
            ..Default::default()
        };
        let mut config = validating_config();
        let mut state = RuntimeState::default();

        init(&mut driver, &FakeWindow::default(), &mut config, &mut state)
            .expect("bootstrap should succeed");

        assert_eq!(state.instance, Some(fake_instance()));
        assert_eq!(
            state.debug_channel.map(|c| c.raw_handle()),
            Some(fake_messenger())
        );
        assert_eq!(state.surface, Some(fake_surface()));
        assert_eq!(state.physical_device, Some(fake_physical_device(1)));
        assert_eq!(state.device, Some(fake_device()));
        assert_eq!(state.graphics_queue, Some(fake_queue(0)));
        assert_eq!(state.present_queue, Some(fake_queue(0)));

        let device_request = &driver.device_requests[0];
        assert_eq!(device_request.layers, [KHRONOS_VALIDATION_LAYER]);

        cleanup(&mut driver, &mut state).expect("cleanup should succeed");
        assert_eq!(
            teardown_log(),
            [
                Teardown::Device(fake_device()),
                Teardown::DebugMessenger(fake_messenger()),
                Teardown::Surface(fake_surface()),
                Teardown::Instance(fake_instance()),
            ]
        );
    }

    #[test]
    fn validation_off_skips_messenger_and_device_layers() {
        let mut driver = FakeDriver {
            devices: vec![FakeDevice::discrete(8192)],
            ..Default::default()
        };
        let mut config = BootstrapConfig::default();
        config.instance.enable_validation = false;
        let mut state = RuntimeState::default();

        init(&mut driver, &FakeWindow::default(), &mut config, &mut state)
            .expect("bootstrap should succeed");

        assert!(state.debug_channel.is_none());
        assert!(driver.device_requests[0].layers.is_empty());
    }

    #[test]
    fn failed_selection_leaves_cleanable_state() {
        let mut driver = FakeDriver::default();
        let mut config = validating_config();
        let mut state = RuntimeState::default();

        let err = init(&mut driver, &FakeWindow::default(), &mut config, &mut state)
            .unwrap_err();

        assert!(matches!(err, BootstrapError::Selection(SelectionError::NoDevices)));
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert!(state.device.is_none());

        cleanup(&mut driver, &mut state).expect("partial cleanup should succeed");
        assert_eq!(
            teardown_log(),
            [
                Teardown::DebugMessenger(fake_messenger()),
                Teardown::Surface(fake_surface()),
                Teardown::Instance(fake_instance()),
            ]
        );
    }

    #[test]
    fn unresolvable_debug_functions_abort_bootstrap() {
        let mut driver = FakeDriver {
            exported_fns: Vec::new(),
            devices: vec![FakeDevice::discrete(8192)],
            ..Default::default()
        };
        let mut config = validating_config();
        let mut state = RuntimeState::default();

        let err = init(&mut driver, &FakeWindow::default(), &mut config, &mut state)
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::Debug(DebugError::FunctionNotResolvable(_))
        ));
        assert_eq!(state.instance, Some(fake_instance()));
        assert!(state.surface.is_none());
    }

    #[test]
    fn failed_device_creation_leaves_cleanable_state() {
        let mut driver = FakeDriver {
            devices: vec![FakeDevice::discrete(8192)],
            device_result: Some(vk::Result::ERROR_INITIALIZATION_FAILED),
            ..Default::default()
        };
        let mut config = validating_config();
        let mut state = RuntimeState::default();

        let err = init(&mut driver, &FakeWindow::default(), &mut config, &mut state)
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::Device(DeviceError::Creation(
                vk::Result::ERROR_INITIALIZATION_FAILED
            ))
        ));
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert!(state.device.is_none());
        assert!(state.graphics_queue.is_none());
        assert_eq!(state.physical_device, Some(fake_physical_device(0)));

        cleanup(&mut driver, &mut state).expect("partial cleanup should succeed");
        assert_eq!(
            teardown_log(),
            [
                Teardown::DebugMessenger(fake_messenger()),
                Teardown::Surface(fake_surface()),
                Teardown::Instance(fake_instance()),
            ]
        );
        assert!(state.is_empty());
    }

    #[test]
    fn failed_surface_creation_keeps_instance_and_messenger() {
        let mut driver = FakeDriver {
            devices: vec![FakeDevice::discrete(8192)],
            surface_result: Err(vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR),
            ..Default::default()
        };
        let mut config = validating_config();
        let mut state = RuntimeState::default();

        let err = init(&mut driver, &FakeWindow::default(), &mut config, &mut state)
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::Surface(SurfaceError::Creation(
                vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR
            ))
        ));
        assert!(state.surface.is_none());
        assert!(driver.device_requests.is_empty());

        cleanup(&mut driver, &mut state).expect("partial cleanup should succeed");
        assert_eq!(
            teardown_log(),
            [
                Teardown::DebugMessenger(fake_messenger()),
                Teardown::Instance(fake_instance()),
            ]
        );
    }

    #[test]
    fn window_without_handles_fails_at_surface_stage() {
        let mut driver = FakeDriver {
            devices: vec![FakeDevice::discrete(8192)],
            ..Default::default()
        };
        let window = FakeWindow {
            handles_available: false,
            ..Default::default()
        };
        let mut config = BootstrapConfig::default();
        config.instance.enable_validation = false;
        let mut state = RuntimeState::default();

        let err = init(&mut driver, &window, &mut config, &mut state).unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::Surface(SurfaceError::Window(_))
        ));
        assert_eq!(err.category(), ErrorCategory::Environment);

        cleanup(&mut driver, &mut state).expect("partial cleanup should succeed");
        assert_eq!(teardown_log(), [Teardown::Instance(fake_instance())]);
    }

    #[test]
    fn failed_messenger_creation_aborts_before_surface() {
        let mut driver = FakeDriver {
            devices: vec![FakeDevice::discrete(8192)],
            messenger_creation_fails: true,
            ..Default::default()
        };
        let mut config = validating_config();
        let mut state = RuntimeState::default();

        let err = init(&mut driver, &FakeWindow::default(), &mut config, &mut state)
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::Debug(DebugError::Creation(
                vk::Result::ERROR_OUT_OF_HOST_MEMORY
            ))
        ));
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert!(state.debug_channel.is_none());
        assert!(state.surface.is_none());

        cleanup(&mut driver, &mut state).expect("partial cleanup should succeed");
        assert_eq!(teardown_log(), [Teardown::Instance(fake_instance())]);
    }

    #[test]
    fn errors_are_categorised() {
        let request: BootstrapError =
            InstanceError::InvalidName("a\0b".into()).into();
        assert_eq!(request.category(), ErrorCategory::Request);

        let environment: BootstrapError =
            DeviceError::Creation(vk::Result::ERROR_INITIALIZATION_FAILED).into();
        assert_eq!(environment.category(), ErrorCategory::Environment);

        let request: BootstrapError = SelectionError::NoSuitableDevice.into();
        assert_eq!(request.category(), ErrorCategory::Request);

        let ordering: BootstrapError = SurfaceError::InstanceNotInitialized.into();
        assert_eq!(ordering.category(), ErrorCategory::Ordering);

        let ordering: BootstrapError = CleanupError::MissingInstance.into();
        assert_eq!(ordering.category(), ErrorCategory::Ordering);
    }
}
