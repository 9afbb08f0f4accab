#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

use std::{
    fs::{self, File},
    path::PathBuf,
};

use clap::Parser;
use rgpu_boot::{
    BootstrapConfig, RuntimeState, ash_driver::AshDriver, cleanup,
    debug::DebugMessengerConfig, log::VulkanLogLevel,
};
use tracing_subscriber::{
    Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::ControlFlow,
    window::{Window as WinitWindow, WindowAttributes},
};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, clap::ValueEnum)]
enum LogVerbosity {
    Off,
    Trace,
    Debug,
    Info,
    Warn,
    #[default]
    Error,
}

impl LogVerbosity {
    fn level_filter(self) -> LevelFilter {
        match self {
            LogVerbosity::Off => LevelFilter::OFF,
            LogVerbosity::Trace => LevelFilter::TRACE,
            LogVerbosity::Debug => LevelFilter::DEBUG,
            LogVerbosity::Info => LevelFilter::INFO,
            LogVerbosity::Warn => LevelFilter::WARN,
            LogVerbosity::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliVulkanLogLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl From<CliVulkanLogLevel> for VulkanLogLevel {
    fn from(value: CliVulkanLogLevel) -> Self {
        match value {
            CliVulkanLogLevel::Verbose => VulkanLogLevel::Verbose,
            CliVulkanLogLevel::Info => VulkanLogLevel::Info,
            CliVulkanLogLevel::Warning => VulkanLogLevel::Warning,
            CliVulkanLogLevel::Error => VulkanLogLevel::Error,
        }
    }
}

#[derive(clap::Parser, Debug)]
struct CliArgs {
    /// Stdout log verbosity. The log file always records everything.
    #[arg(short = 'l', long, value_enum, default_value_t)]
    log_level: LogVerbosity,
    /// Minimum severity forwarded from the debug messenger.
    #[arg(short = 'g', long = "vk-log-level")]
    vk_log_level: Option<CliVulkanLogLevel>,
    /// TOML bootstrap config. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Force validation layers on or off.
    #[arg(long, action = clap::ArgAction::Set)]
    validation: Option<bool>,
}

impl CliArgs {
    fn bootstrap_config(&self) -> eyre::Result<BootstrapConfig> {
        let mut config = match self.config {
            Some(ref path) => BootstrapConfig::load(path)?,
            None => {
                let mut config = BootstrapConfig::default();
                config.instance.application_name = "samp-app".to_owned();
                config
            }
        };

        if let Some(validation) = self.validation {
            config.instance.enable_validation = validation;
        }
        if let Some(level) = self.vk_log_level {
            config.debug_messenger = Some(DebugMessengerConfig {
                max_log_level: level.into(),
                ..config.debug_messenger.unwrap_or_default()
            });
        }
        Ok(config)
    }
}

/// Where the log file goes: the platform runtime dir if there is one,
/// otherwise the data dir, otherwise the working directory.
fn log_directory() -> eyre::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "rgpu-boot", "samp-app");
    match dirs {
        Some(dirs) => Ok(dirs
            .runtime_dir()
            .unwrap_or_else(|| dirs.data_dir())
            .to_owned()),
        None => Ok(std::env::current_dir()?),
    }
}

fn install_subscriber(verbosity: LogVerbosity) -> eyre::Result<()> {
    let log_path = log_directory()?.join("samp-app.log");
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(File::create(&log_path)?)
        .with_ansi(false);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(verbosity.level_filter());

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();
    tracing::info!("Logging to {}", log_path.display());
    Ok(())
}

fn main() -> eyre::Result<()> {
    let cli_args = CliArgs::parse();
    if cli_args.log_level != LogVerbosity::Off {
        install_subscriber(cli_args.log_level)?;
    }
    tracing::debug!("{:#?}", cli_args);

    let config = cli_args.bootstrap_config()?;
    tracing::debug!("Bootstrap config: {:#?}", config);

    let event_loop = winit::event_loop::EventLoop::builder().build()?;

    //SAFETY: Loads the system vulkan library, nothing else is loaded yet.
    //Every handle is destroyed through cleanup before the driver is dropped
    let driver = unsafe { AshDriver::load() }?;

    let mut app = AppRunner(Some(App::Initializing(InitializingState { driver, config })));

    tracing::trace!("Entering main event loop");
    Ok(event_loop.run_app(&mut app)?)
}

#[derive(Debug)]
struct AppRunner(Option<App>);

#[derive(Debug)]
enum App {
    Initializing(InitializingState),
    Running(RunningState),
    Exiting(ExitingState),
}

#[derive(Debug)]
struct InitializingState {
    driver: AshDriver,
    config: BootstrapConfig,
}

#[derive(Debug)]
struct RunningState {
    driver: AshDriver,
    state: RuntimeState,
    win: WinitWindow,
}

#[derive(Debug)]
struct ExitingState {}

/// Destroys every Vulkan object, then the window.
fn shutdown(mut driver: AshDriver, mut state: RuntimeState, win: WinitWindow) {
    if let Err(e) = cleanup(&mut driver, &mut state) {
        tracing::error!("Error during Vulkan cleanup: {}", e);
    }
    tracing::debug!("Dropping window {:?}", win.id());
    drop(win);
    drop(driver);
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        assert!(self.0.is_some());
        if let Some(initializing_state) = self.take_initializing() {
            event_loop.set_control_flow(ControlFlow::Wait);
            let InitializingState {
                mut driver,
                mut config,
            } = initializing_state;

            let win = match event_loop.create_window(
                WindowAttributes::default()
                    .with_title(config.instance.application_name.as_str())
                    .with_inner_size(LogicalSize {
                        width: 1600,
                        height: 900,
                    }),
            ) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!("Error while creating window: {}", e);
                    self.transition_to_exiting("Initializing", event_loop);
                    return;
                }
            };

            let mut state = RuntimeState::default();
            if let Err(e) = rgpu_boot::init(&mut driver, &win, &mut config, &mut state) {
                tracing::error!("Vulkan bootstrap failed ({:?}): {}", e.category(), e);
                shutdown(driver, state, win);
                self.transition_to_exiting("Initializing", event_loop);
                return;
            }

            tracing::debug!("State transition: Initializing -> Running");
            self.set_running(RunningState { driver, state, win });
        } else if self.is_exiting() {
            tracing::warn!("resumed() called while in Exiting state");
        }
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        window_id: winit::window::WindowId,
        window_event: WindowEvent,
    ) {
        assert!(self.0.is_some());
        if !self.is_running_window(window_id) {
            return;
        }

        if matches!(&window_event, WindowEvent::CloseRequested) {
            tracing::trace!("Close window request received for window");
            self.exit_from_running(event_loop);
        }
    }

    fn exiting(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(RunningState { driver, state, win }) = self.take_running() {
            tracing::debug!("Event loop exiting while Running, cleaning up");
            shutdown(driver, state, win);
            self.set_exiting(ExitingState {});
        }
    }
}

impl AppRunner {
    fn transition_to_exiting(
        &mut self,
        from_state: &'static str,
        event_loop: &winit::event_loop::ActiveEventLoop,
    ) {
        tracing::debug!("State transition: {} -> Exiting", from_state);
        self.set_exiting(ExitingState {});
        event_loop.exit();
    }

    fn exit_from_running(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(RunningState { driver, state, win }) = self.take_running() {
            shutdown(driver, state, win);
            self.transition_to_exiting("Running", event_loop);
        } else {
            tracing::warn!("Requested Running -> Exiting transition while not in Running state");
            event_loop.exit();
        }
    }

    fn is_running_window(&self, window_id: winit::window::WindowId) -> bool {
        matches!(&self.0, Some(App::Running(running)) if running.win.id() == window_id)
    }

    fn take_initializing(&mut self) -> Option<InitializingState> {
        match self.0.take() {
            Some(App::Initializing(state)) => Some(state),
            other => {
                self.0 = other;
                None
            }
        }
    }

    fn take_running(&mut self) -> Option<RunningState> {
        match self.0.take() {
            Some(App::Running(state)) => Some(state),
            other => {
                self.0 = other;
                None
            }
        }
    }

    fn set_running(&mut self, state: RunningState) {
        debug_assert!(self.0.is_none());
        self.0 = Some(App::Running(state));
    }

    fn is_exiting(&self) -> bool {
        matches!(self.0, Some(App::Exiting(_)))
    }

    fn set_exiting(&mut self, state: ExitingState) {
        self.0 = Some(App::Exiting(state));
    }
}
