// Fixed-rate control loop with watchdog, plus the event-driven command path
// Note: the loop and the command subscriber run as separate tasks. They share the
// watchdog and the driver handle; every driver call is serialized by the handle.

use std::sync::PoisonError;
use std::time::Instant;

use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

// local imports
use crate::config::{
    ConfigError, RuntimeConfig, TOPIC_CMD_VEL, TOPIC_DIAGNOSTICS, TOPIC_HEALTH, TOPIC_ODOM, TOPIC_TF,
};
use crate::diagnostics::check_vitals;
use crate::messages::{DiagnosticStatus, Odometry, RuntimeHealth, Transform, TwistCommand};
use crate::motor::{CommandMapper, DriverHandle, MotorCommand, MotorController};
use crate::odometry::OdometryIntegrator;
use crate::watchdog::{SharedWatchdog, Watchdog, WatchdogEvent};

/// Everything one loop tick wants published
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub health: RuntimeHealth,
    /// A stop was sent to the driver this tick
    pub stopped: bool,
    pub odometry: Option<(Odometry, Transform)>,
    pub diagnostics: Option<DiagnosticStatus>,
}

/// Accepts velocity commands as they arrive
pub struct CommandPath<D> {
    mapper: CommandMapper,
    watchdog: SharedWatchdog,
    driver: DriverHandle<D>,
}

impl<D> Clone for CommandPath<D> {
    fn clone(&self) -> Self {
        Self {
            mapper: self.mapper,
            watchdog: self.watchdog.clone(),
            driver: self.driver.clone(),
        }
    }
}

impl<D: MotorController> CommandPath<D> {
    /// Refresh the watchdog, map the twist and send it straight to the motors
    ///
    /// Driver failures are logged here and never returned to the caller.
    pub async fn accept(&self, twist: TwistCommand, now: Instant) -> MotorCommand {
        debug!("Twist: linear={:.3} angular={:.3}", twist.linear, twist.angular);
        self.watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(now);

        let command = self.mapper.map(&twist);
        debug!(
            "Motor command: m1={} m2={}",
            command.left.signed(),
            command.right.signed()
        );

        if let Err(e) = self.driver.set_motor_command(command).await {
            warn!("Failed to send motor command: {}", e);
        }
        command
    }
}

pub struct ControlLoop<D> {
    odometry: OdometryIntegrator,
    watchdog: SharedWatchdog,
    driver: DriverHandle<D>,
    commands: CommandPath<D>,
}

impl<D: MotorController> ControlLoop<D> {
    pub fn new(config: &RuntimeConfig, driver: DriverHandle<D>, now: Instant) -> Result<Self, ConfigError> {
        let odometry = OdometryIntegrator::new(config.ticks_per_meter, config.base_width, now)?;
        let mapper = CommandMapper::new(config.linear_max, config.angular_max)?;
        let watchdog = Watchdog::new(config.cmd_timeout, now).shared();

        let commands = CommandPath {
            mapper,
            watchdog: watchdog.clone(),
            driver: driver.clone(),
        };

        Ok(Self {
            odometry,
            watchdog,
            driver,
            commands,
        })
    }

    /// Handle for the command-acceptance task
    pub fn command_path(&self) -> CommandPath<D> {
        self.commands.clone()
    }

    pub fn odometry(&self) -> &OdometryIntegrator {
        &self.odometry
    }

    /// Take the controller's current encoder counts as the zero point
    pub async fn baseline(&mut self, now: Instant) {
        match self.driver.read_encoders().await {
            Ok((left, right)) => {
                info!("Encoder baseline: left={} right={}", left.ticks, right.ticks);
                self.odometry.reset(left.ticks, right.ticks, now);
            }
            Err(e) => warn!("Could not read encoder baseline, starting from zero: {}", e),
        }
    }

    /// One loop iteration
    pub async fn tick(&mut self, now: Instant) -> TickOutput {
        // 1. Watchdog: stop on every stale tick, but only say so once
        let event = self
            .watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .poll(now);

        if event == WatchdogEvent::Tripped {
            info!("No command received within the timeout, stopping");
        }
        let mut stale = event.requires_stop();
        if stale {
            // Re-checked under the driver lock: a command accepted since the poll wins
            let watchdog = self.watchdog.clone();
            let still_stale =
                move || watchdog.lock().unwrap_or_else(PoisonError::into_inner).check(now);
            match self.driver.stop_if(still_stale).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Command arrived before the stop was sent, keeping it");
                    stale = false;
                }
                Err(e) => error!("Could not stop: {}", e),
            }
        }

        // 2. Odometry from a fresh encoder pair; skipped when the read fails
        let odometry = match self.driver.read_encoders().await {
            Ok((left, right)) => {
                debug!(
                    "Encoders {} {} (status 0x{:02X} 0x{:02X})",
                    left.ticks, right.ticks, left.status, right.status
                );
                let velocity = self.odometry.update(left.ticks, right.ticks, now);
                let pose = self.odometry.pose();
                Some((Odometry::new(pose, velocity), Transform::from_pose(pose)))
            }
            Err(e) => {
                warn!("Encoder read failed, skipping odometry: {}", e);
                None
            }
        };

        // 3. Diagnostics, withheld when the status read fails
        let diagnostics = check_vitals(&self.driver)
            .await
            .map(|report| DiagnosticStatus::from(&report));

        TickOutput {
            health: if stale {
                RuntimeHealth::CmdStale
            } else {
                RuntimeHealth::Ok
            },
            stopped: stale,
            odometry,
            diagnostics,
        }
    }

    /// Final stop before the driver is released, retried once
    pub async fn shutdown(self) {
        info!("Shutting down");
        if let Err(e) = self.driver.stop().await {
            error!("Shutdown stop failed, trying again: {}", e);
            if let Err(e) = self.driver.stop().await {
                error!("Could not stop motors on shutdown: {}", e);
            }
        }
    }
}

async fn publish<T: Serialize>(publisher: &zenoh::pubsub::Publisher<'_>, value: &T) {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize message: {}", e);
            return;
        }
    };
    if let Err(e) = publisher.put(json).await {
        warn!("Failed to publish on {}: {}", publisher.key_expr(), e);
    }
}

pub async fn run<D: MotorController>(
    config: RuntimeConfig,
    driver: D,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_VEL).await?;
    let pub_odom = session.declare_publisher(TOPIC_ODOM).await?;
    let pub_tf = session.declare_publisher(TOPIC_TF).await?;
    let pub_diagnostics = session.declare_publisher(TOPIC_DIAGNOSTICS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let driver = DriverHandle::new(driver, config.driver_timeout);
    match driver.call("read_version", |d| d.read_version()).await {
        Ok(version) => info!("Controller version: {}", version.trim()),
        Err(e) => warn!("Could not get version from controller: {}", e),
    }
    if let Err(e) = driver.stop().await {
        warn!("Initial stop failed: {}", e);
    }

    let mut control = ControlLoop::new(&config, driver, Instant::now())?;
    control.baseline(Instant::now()).await;

    // Command acceptance runs on its own task, independent of the loop period
    let commands = control.command_path();
    let command_task = tokio::spawn(async move {
        while let Ok(sample) = subscriber.recv_async().await {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<TwistCommand>(&payload) {
                Ok(twist) => {
                    commands.accept(twist, Instant::now()).await;
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }
    });

    let mut tick = interval(config.loop_period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Runtime started: {:.1}Hz loop, {:.1}s watchdog timeout",
        1.0 / config.loop_period.as_secs_f64(),
        config.cmd_timeout.as_secs_f64()
    );
    info!("Subscribed to: {}", TOPIC_CMD_VEL);
    info!(
        "Publishing to: {}, {}, {}, {}",
        TOPIC_ODOM, TOPIC_TF, TOPIC_DIAGNOSTICS, TOPIC_HEALTH
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
            _ = tick.tick() => {
                let output = control.tick(Instant::now()).await;

                if let Some((odom, tf)) = &output.odometry {
                    publish(&pub_tf, tf).await;
                    publish(&pub_odom, odom).await;
                }
                if let Some(status) = &output.diagnostics {
                    publish(&pub_diagnostics, status).await;
                }
                publish(&pub_health, &output.health).await;
            }
        }
    }

    // No commands may reach the motors after the final stop
    command_task.abort();
    let _ = command_task.await;
    control.shutdown().await;

    info!("Exiting");
    Ok(())
}
