//! The per-tick control loop: fuse whatever telemetry arrived, decide
//! whether coverage still holds, and command the observer.

use na::Point2;
use qcoord_protocol::{CameraAim, GcsCommand, ObserverEvent, TargetTelemetry, Waypoint};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::camera::CameraModel;
use crate::centroid::{self, EstimatorError, GroupMotion, Selector};
use crate::channel::{Receiver, Sender};
use crate::coverage::CoverageEvaluator;
use crate::gimbal;
use crate::scenario::Config;
use crate::standoff::{PlanError, StandoffPlanner};
use crate::store::{ObserverPose, TargetStore};
use crate::units::Time;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopState {
    /// Pinged the observer, waiting for it to answer.
    AwaitingFirstContact,
    Tracking,
    Planning,
    Commanding,
    Terminated,
}

#[derive(Debug, Error)]
enum TickError {
    #[error(transparent)]
    Estimator(#[from] EstimatorError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

pub struct CoordinationLoop {
    camera: CameraModel,
    store: TargetStore,
    pose: ObserverPose,
    planner: StandoffPlanner,
    evaluator: CoverageEvaluator,
    motion: GroupMotion,
    state: LoopState,

    observer_rx: Receiver<ObserverEvent>,
    target_rxs: Vec<(String, Receiver<TargetTelemetry>)>,
    cmd_tx: Sender<GcsCommand>,

    /// Ground point the camera was last told to look at; the footprint for
    /// the coverage decision is computed against it.
    last_aim: Option<Point2<f64>>,
    elapsed: Time,
}

impl CoordinationLoop {
    pub fn new(
        config: &Config,
        observer_rx: Receiver<ObserverEvent>,
        target_rxs: Vec<(String, Receiver<TargetTelemetry>)>,
        cmd_tx: Sender<GcsCommand>,
    ) -> Self {
        CoordinationLoop {
            camera: config.camera_model(),
            store: TargetStore::new(target_rxs.iter().map(|(name, _)| name.clone())),
            pose: ObserverPose::new(config.altitude()),
            planner: StandoffPlanner::new(config.standoff_margin()),
            evaluator: CoverageEvaluator::new(config.coverage_margin()),
            motion: GroupMotion::default(),
            state: LoopState::AwaitingFirstContact,
            observer_rx,
            target_rxs,
            cmd_tx,
            last_aim: None,
            elapsed: Time::from_secs(0.0),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn store(&self) -> &TargetStore {
        &self.store
    }

    /// Kicks off the session by pinging the observer. The handshake
    /// completes over the following ticks.
    pub fn init(&mut self) {
        if self.store.is_empty() {
            warn!("no targets to track; terminating");
            self.state = LoopState::Terminated;
            return;
        }
        info!("pinging observer");
        self.send(GcsCommand::Ping);
    }

    pub fn step(&mut self, dt: Time) {
        self.elapsed += dt;
        match self.state {
            LoopState::Terminated => {}
            LoopState::AwaitingFirstContact => self.step_handshake(),
            LoopState::Tracking | LoopState::Planning | LoopState::Commanding => {
                self.step_tracking()
            }
        }
    }

    /// Orderly shutdown: halts the observer and parks the loop.
    pub fn halt(&mut self) {
        if self.state == LoopState::Terminated {
            return;
        }
        info!("halting observer");
        self.send(GcsCommand::Halt);
        self.state = LoopState::Terminated;
    }

    /// Like `halt`, but tells the observer to shut down entirely. Used
    /// when the session itself is over rather than paused.
    pub fn terminate(&mut self) {
        if self.state == LoopState::Terminated {
            return;
        }
        info!("terminating observer");
        self.send(GcsCommand::Terminate);
        self.state = LoopState::Terminated;
    }

    fn step_handshake(&mut self) {
        let mut answered = false;
        while let Some(event) = self.observer_rx.recv() {
            match event {
                ObserverEvent::Pong => answered = true,
                ObserverEvent::Telemetry(t) => self.pose.apply(&t),
            }
        }
        if answered {
            info!("observer answered ping; entering waypoint mode");
            self.send(GcsCommand::EnterWaypointMode);
            self.transition(LoopState::Tracking);
        }
    }

    fn step_tracking(&mut self) {
        while let Some(event) = self.observer_rx.recv() {
            match event {
                ObserverEvent::Pong => {}
                ObserverEvent::Telemetry(t) => self.pose.apply(&t),
            }
        }

        let mut fresh_target_data = false;
        for (name, rx) in self.target_rxs.iter_mut() {
            while let Some(telemetry) = rx.recv() {
                self.store.apply(name, &telemetry);
                fresh_target_data = true;
            }
        }

        // Only replan on new data; a quiet tick is a no-op, not an error.
        if !fresh_target_data {
            trace!("no target telemetry this tick");
            return;
        }

        self.transition(LoopState::Planning);
        if let Err(e) = self.plan_and_command() {
            warn!(error = %e, "planning skipped this tick");
        }
        self.transition(LoopState::Tracking);
    }

    fn plan_and_command(&mut self) -> Result<(), TickError> {
        let position_centroid = centroid::centroid(&self.store, Selector::Position)?;
        let destination_centroid = centroid::centroid(&self.store, Selector::Destination)?;

        if let Some(speed) = self.motion.observe(position_centroid, self.elapsed) {
            debug!(
                speed_mps = speed.as_meters_per_second(),
                "group speed of advance"
            );
        }

        // centroid() succeeded, so at least one ranged target exists
        let extremes = centroid::extremes(&self.store, position_centroid)
            .expect("in-contact targets cannot vanish within a tick");
        let dmax = extremes.farthest.distance;
        debug!(
            farthest = %extremes.farthest.name,
            distance_m = dmax.as_meters(),
            "group spread"
        );

        let reposition = self.coverage_demands_reposition();
        let waypoint =
            self.planner
                .plan(position_centroid, destination_centroid, dmax, reposition)?;

        self.transition(LoopState::Commanding);
        // Re-sent every planning tick, changed or not; the observer treats
        // the stream as a heartbeat.
        self.send(GcsCommand::Waypoint(Waypoint {
            x: waypoint.position.x,
            y: waypoint.position.y,
            heading_x: waypoint.heading_target.x,
            heading_y: waypoint.heading_target.y,
        }));

        let aim = waypoint.heading_target;
        match gimbal::aim_command(
            self.pose.position,
            self.pose.altitude,
            aim,
            self.pose.yaw,
            self.pose.pitch,
        ) {
            Ok(cmd) => {
                debug!(
                    pan_deg = cmd.pan.as_degrees(),
                    tilt_deg = cmd.tilt.as_degrees(),
                    "gimbal solution"
                );
                self.send(GcsCommand::CameraAim(CameraAim { x: aim.x, y: aim.y }));
                self.last_aim = Some(aim);
            }
            Err(e) => warn!(error = %e, "gimbal aim solution failed; aim command skipped"),
        }

        Ok(())
    }

    /// Evaluates the current footprint against the group. Geometry failures
    /// mean "no coverage data" for the tick; they never force a reposition.
    fn coverage_demands_reposition(&mut self) -> bool {
        let Some(aim) = self.last_aim else {
            return false;
        };
        let footprint = match self.camera.ground_footprint(
            self.pose.position,
            aim,
            self.pose.altitude,
            self.pose.gimbal_pan,
            self.pose.gimbal_tilt,
        ) {
            Ok(footprint) => footprint,
            Err(e) => {
                warn!(error = %e, "footprint geometry failed; coverage skipped this tick");
                return false;
            }
        };
        match self.evaluator.evaluate(&footprint, &mut self.store) {
            Ok(report) => {
                for (name, info) in report.per_target.iter().filter(|(_, i)| i.is_outside()) {
                    debug!(
                        target_name = %name,
                        distance_m = info.signed_relative_distance.as_meters(),
                        "target outside camera view"
                    );
                }
                report.reposition
            }
            Err(e) => {
                warn!(error = %e, "coverage evaluation failed; coverage skipped this tick");
                false
            }
        }
    }

    fn transition(&mut self, next: LoopState) {
        trace!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn send(&mut self, cmd: GcsCommand) {
        if let Err(e) = self.cmd_tx.try_send(cmd) {
            warn!(error = %e, "dropping outgoing command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Step, StepChannel};
    use approx::assert_relative_eq;
    use qcoord_protocol::ObserverTelemetry;

    const TICK: Time = Time::from_secs(0.5);

    struct Rig {
        coordinator: CoordinationLoop,
        observer_ch: StepChannel<ObserverEvent>,
        observer_tx: crate::channel::Sender<ObserverEvent>,
        target_chs: Vec<StepChannel<TargetTelemetry>>,
        target_txs: Vec<crate::channel::Sender<TargetTelemetry>>,
        cmd_ch: StepChannel<GcsCommand>,
        cmd_rx: Receiver<GcsCommand>,
    }

    impl Rig {
        fn new(targets: &[&str]) -> Self {
            let mut config = Config::nominal();
            config.targets = targets.iter().map(|t| t.to_string()).collect();

            let mut observer_ch = StepChannel::new();
            let observer_tx = observer_ch.sender(None);
            let observer_rx = observer_ch.receiver(None);

            let mut target_chs = Vec::new();
            let mut target_txs = Vec::new();
            let mut target_rxs = Vec::new();
            for name in targets {
                let mut ch = StepChannel::new();
                target_txs.push(ch.sender(None));
                target_rxs.push((name.to_string(), ch.receiver(None)));
                target_chs.push(ch);
            }

            let mut cmd_ch = StepChannel::new();
            let cmd_tx = cmd_ch.sender(None);
            let cmd_rx = cmd_ch.receiver(None);

            Rig {
                coordinator: CoordinationLoop::new(&config, observer_rx, target_rxs, cmd_tx),
                observer_ch,
                observer_tx,
                target_chs,
                target_txs,
                cmd_ch,
                cmd_rx,
            }
        }

        /// Delivers pending telemetry, runs one tick, delivers commands.
        fn tick(&mut self) -> Vec<GcsCommand> {
            self.observer_ch.step().unwrap();
            for ch in self.target_chs.iter_mut() {
                ch.step().unwrap();
            }
            self.coordinator.step(TICK);
            self.drain_commands()
        }

        fn drain_commands(&mut self) -> Vec<GcsCommand> {
            self.cmd_ch.step().unwrap();
            let mut cmds = Vec::new();
            while let Some(cmd) = self.cmd_rx.recv() {
                cmds.push(cmd);
            }
            cmds
        }

        fn send_target(&mut self, idx: usize, pos: (f64, f64), dest: (f64, f64)) {
            self.target_txs[idx]
                .try_send(TargetTelemetry {
                    pos_x: pos.0,
                    pos_y: pos.1,
                    dest_x: dest.0,
                    dest_y: dest.1,
                })
                .unwrap();
        }

        fn send_observer_pose(&mut self, pos: (f64, f64)) {
            self.observer_tx
                .try_send(ObserverEvent::Telemetry(ObserverTelemetry {
                    x_gimbal_deg: 0.0,
                    y_gimbal_deg: 0.0,
                    pos_x: pos.0,
                    pos_y: pos.1,
                    pos_z: 30.0,
                    yaw_rad: 0.0,
                    pitch_rad: 0.0,
                }))
                .unwrap();
        }

        fn complete_handshake(&mut self) {
            self.coordinator.init();
            let cmds = self.drain_commands();
            assert_eq!(cmds, vec![GcsCommand::Ping]);

            self.observer_tx.try_send(ObserverEvent::Pong).unwrap();
            let cmds = self.tick();
            assert_eq!(cmds, vec![GcsCommand::EnterWaypointMode]);
            assert_eq!(self.coordinator.state(), LoopState::Tracking);
        }
    }

    #[test]
    fn handshake_then_tracking() {
        let mut rig = Rig::new(&["DJANGO"]);
        rig.complete_handshake();
    }

    #[test]
    fn quiet_tick_is_a_noop() {
        let mut rig = Rig::new(&["DJANGO"]);
        rig.complete_handshake();

        // Nothing in flight, and observer-only telemetry does not count as
        // new target data either.
        assert!(rig.tick().is_empty());
        rig.send_observer_pose((5.0, 0.0));
        assert!(rig.tick().is_empty());
        assert_eq!(rig.coordinator.store().in_contact().count(), 0);
    }

    #[test]
    fn first_planning_cycle_commands_standoff_waypoint() {
        let mut rig = Rig::new(&["DJANGO", "SUSAN", "ANTON"]);
        rig.complete_handshake();

        // Group advancing due north
        rig.send_target(0, (0.0, 0.0), (0.0, 5.0));
        rig.send_target(1, (10.0, 0.0), (10.0, 5.0));
        rig.send_target(2, (5.0, 10.0), (5.0, 15.0));
        let cmds = rig.tick();

        assert_eq!(cmds.len(), 2);
        let GcsCommand::Waypoint(wp) = &cmds[0] else {
            panic!("expected a waypoint, got {:?}", cmds[0]);
        };
        // Centroid (5, 10/3); farthest member is ANTON at 20/3; the
        // observer stands off behind the group at dmax + 2.
        assert_relative_eq!(wp.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(wp.y, 10.0 / 3.0 - (20.0 / 3.0 + 2.0), epsilon = 1e-9);
        assert_relative_eq!(wp.heading_x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(wp.heading_y, 10.0 / 3.0, epsilon = 1e-9);

        let GcsCommand::CameraAim(aim) = &cmds[1] else {
            panic!("expected a camera aim, got {:?}", cmds[1]);
        };
        assert_relative_eq!(aim.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(aim.y, 10.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn stationary_group_emits_nothing() {
        let mut rig = Rig::new(&["DJANGO"]);
        rig.complete_handshake();

        // Destination equals position: no travel direction to reverse
        rig.send_target(0, (5.0, 5.0), (5.0, 5.0));
        assert!(rig.tick().is_empty());
        // But the telemetry itself was applied
        assert!(rig.coordinator.store().get("DJANGO").unwrap().in_contact);
    }

    #[test]
    fn waypoint_is_debounced_while_coverage_holds() {
        let mut rig = Rig::new(&["DJANGO", "SUSAN", "ANTON"]);
        rig.complete_handshake();

        rig.send_target(0, (0.0, 0.0), (0.0, 5.0));
        rig.send_target(1, (10.0, 0.0), (10.0, 5.0));
        rig.send_target(2, (5.0, 10.0), (5.0, 15.0));
        let first = rig.tick();
        let GcsCommand::Waypoint(first_wp) = first[0] else {
            panic!("expected a waypoint");
        };

        // Observer on station; the 768°-basis footprint at altitude 30
        // reaches ~13.4 m around it, so a tightened-up group stays deep in
        // view and the waypoint must not move.
        rig.send_observer_pose((5.0, 0.0));
        rig.send_target(0, (2.0, 0.0), (2.0, 5.0));
        rig.send_target(1, (8.0, 0.0), (8.0, 5.0));
        rig.send_target(2, (5.0, 5.0), (5.0, 10.0));
        let second = rig.tick();

        assert_eq!(second.len(), 2);
        let GcsCommand::Waypoint(second_wp) = second[0] else {
            panic!("expected a waypoint");
        };
        assert_relative_eq!(second_wp.x, first_wp.x);
        assert_relative_eq!(second_wp.y, first_wp.y);
    }

    #[test]
    fn coverage_loss_forces_replan() {
        let mut rig = Rig::new(&["DJANGO", "SUSAN"]);
        rig.complete_handshake();

        rig.send_target(0, (0.0, 0.0), (0.0, 5.0));
        rig.send_target(1, (10.0, 0.0), (10.0, 5.0));
        let first = rig.tick();
        let GcsCommand::Waypoint(first_wp) = first[0] else {
            panic!("expected a waypoint");
        };

        // SUSAN breaks away well outside the ~13.4 m footprint
        rig.send_observer_pose((5.0, 0.0));
        rig.send_target(0, (0.0, 0.0), (0.0, 5.0));
        rig.send_target(1, (60.0, 0.0), (60.0, 5.0));
        let second = rig.tick();

        let GcsCommand::Waypoint(second_wp) = second[0] else {
            panic!("expected a waypoint");
        };
        // New centroid (30, 0) pushes the standoff point away
        assert!(
            (second_wp.x - first_wp.x).abs() > 1.0 || (second_wp.y - first_wp.y).abs() > 1.0,
            "waypoint should have moved: {first_wp:?} vs {second_wp:?}"
        );
        assert!(rig
            .coordinator
            .store()
            .get("SUSAN")
            .unwrap()
            .coverage
            .unwrap()
            .is_outside());
    }

    #[test]
    fn halt_parks_the_loop() {
        let mut rig = Rig::new(&["DJANGO"]);
        rig.complete_handshake();

        rig.coordinator.halt();
        assert_eq!(rig.drain_commands(), vec![GcsCommand::Halt]);
        assert_eq!(rig.coordinator.state(), LoopState::Terminated);

        // Ticks after termination do nothing
        rig.send_target(0, (0.0, 0.0), (1.0, 1.0));
        assert!(rig.tick().is_empty());

        // Halting twice does not double-send
        rig.coordinator.halt();
        assert!(rig.drain_commands().is_empty());
    }

    #[test]
    fn terminate_shuts_the_observer_down() {
        let mut rig = Rig::new(&["DJANGO"]);
        rig.complete_handshake();
        rig.coordinator.terminate();
        assert_eq!(rig.drain_commands(), vec![GcsCommand::Terminate]);
        assert_eq!(rig.coordinator.state(), LoopState::Terminated);
    }
}
