//! Fixed-station coverage monitor: the observer holds an assigned waypoint
//! and the loop reports which targets its camera can still see.

use qcoord_protocol::{CameraAim, GcsCommand, ObserverEvent, TargetTelemetry, Waypoint};
use na::Point2;
use tracing::{info, warn};

use crate::camera::CameraModel;
use crate::channel::{Receiver, Sender};
use crate::coverage::CoverageEvaluator;
use crate::scenario::Config;
use crate::store::{ObserverPose, TargetStore};
use crate::units::{Length, Time};

pub struct PositionMonitor {
    camera: CameraModel,
    altitude: Length,
    station: Waypoint,
    pose: ObserverPose,
    store: TargetStore,
    evaluator: CoverageEvaluator,
    report_interval: u32,
    counter: u32,
    holding: bool,
    terminated: bool,

    observer_rx: Receiver<ObserverEvent>,
    target_rxs: Vec<(String, Receiver<TargetTelemetry>)>,
    cmd_tx: Sender<GcsCommand>,
}

impl PositionMonitor {
    pub fn new(
        config: &Config,
        station: Waypoint,
        observer_rx: Receiver<ObserverEvent>,
        target_rxs: Vec<(String, Receiver<TargetTelemetry>)>,
        cmd_tx: Sender<GcsCommand>,
    ) -> Self {
        PositionMonitor {
            camera: config.camera_model(),
            altitude: config.altitude(),
            station,
            pose: ObserverPose::new(config.altitude()),
            store: TargetStore::new(target_rxs.iter().map(|(name, _)| name.clone())),
            evaluator: CoverageEvaluator::new(config.coverage_margin()),
            report_interval: config.coverage_report_interval,
            counter: 0,
            holding: false,
            terminated: false,
            observer_rx,
            target_rxs,
            cmd_tx,
        }
    }

    pub fn store(&self) -> &TargetStore {
        &self.store
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn init(&mut self) {
        info!("pinging observer");
        self.send(GcsCommand::Ping);
    }

    pub fn step(&mut self, _dt: Time) {
        if self.terminated {
            return;
        }

        let mut answered = false;
        while let Some(event) = self.observer_rx.recv() {
            match event {
                ObserverEvent::Pong => answered = true,
                ObserverEvent::Telemetry(t) => self.pose.apply(&t),
            }
        }
        if !self.holding {
            if answered {
                info!("observer answered ping; entering waypoint mode");
                self.send(GcsCommand::EnterWaypointMode);
                self.holding = true;
            }
            return;
        }

        for (name, rx) in self.target_rxs.iter_mut() {
            while let Some(telemetry) = rx.recv() {
                self.store.apply(name, &telemetry);
            }
        }

        // The station and aim never change; re-sending them every tick is
        // the observer's heartbeat.
        self.send(GcsCommand::Waypoint(self.station));
        self.send(GcsCommand::CameraAim(CameraAim {
            x: self.station.heading_x,
            y: self.station.heading_y,
        }));

        if self.counter % self.report_interval == 0 {
            self.report_coverage();
        }
        self.counter = self.counter.wrapping_add(1);
    }

    pub fn halt(&mut self) {
        if self.terminated {
            return;
        }
        info!("halting observer");
        self.send(GcsCommand::Halt);
        self.terminated = true;
    }

    /// Footprint from the assigned station toward the assigned heading,
    /// with whatever gimbal angles the observer last reported.
    fn report_coverage(&mut self) {
        let station = Point2::new(self.station.x, self.station.y);
        let aim = Point2::new(self.station.heading_x, self.station.heading_y);

        let footprint = match self.camera.ground_footprint(
            station,
            aim,
            self.altitude,
            self.pose.gimbal_pan,
            self.pose.gimbal_tilt,
        ) {
            Ok(footprint) => footprint,
            Err(e) => {
                warn!(error = %e, "footprint geometry failed; coverage report skipped");
                return;
            }
        };
        match self.evaluator.evaluate(&footprint, &mut self.store) {
            Ok(report) => {
                for (name, coverage) in report.per_target.iter() {
                    if coverage.is_outside() {
                        info!(target_name = %name, "target is outside camera view");
                    } else {
                        info!(target_name = %name, "target is within camera view");
                    }
                }
            }
            Err(e) => warn!(error = %e, "coverage evaluation failed; report skipped"),
        }
    }

    fn send(&mut self, cmd: GcsCommand) {
        if let Err(e) = self.cmd_tx.try_send(cmd) {
            warn!(error = %e, "dropping outgoing command");
        }
    }
}
