//! Plan, simulate, re-plan orchestration for one pile.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::state::PipelineState;
use crate::config::PipelineConfig;
use crate::core::{HeightMap, PileHeight, PushSequence, RunIdentity};
use crate::error::{Error, Result};
use crate::io::{HeightmapStore, STAGE_HEIGHTMAP, save_control_sequence};
use crate::optimize::{
    ControlOptimizer, DesiredConfig, OptimizerProfile, create_desired_heightmap, create_optimizer,
};
use crate::reduce::{PointCloud, PointCloudReducer, RegionOfInterest};
use crate::sim::SimulationRunner;
use crate::watch::{FileWatcher, WaitPolicy};

/// Outcome of one run.
#[derive(Debug)]
pub struct PipelineReport {
    /// First-push identity of the run
    pub identity: RunIdentity,
    /// Terminal state
    pub state: PipelineState,
    pub first_commands: PathBuf,
    pub intermediate_heightmap: Option<PathBuf>,
    pub second_commands: Option<PathBuf>,
    /// Stage-2 error that ended the run in `Failed`
    pub failure: Option<Error>,
}

impl PipelineReport {
    pub fn is_complete(&self) -> bool {
        self.state == PipelineState::Done
    }
}

/// Drives the stages of a run in order.
///
/// Stage 1 (initial map to first-push commands) errors are returned as
/// `Err`. Once the first-push commands are on disk, later errors are logged
/// and recorded in the report's `Failed` state instead; the first-push
/// artifact stays valid either way. Nothing is retried.
pub struct PipelineDriver {
    store: HeightmapStore,
    reducer: PointCloudReducer,
    region: RegionOfInterest,
    desired: DesiredConfig,
    profile: OptimizerProfile,
    optimizer: Box<dyn ControlOptimizer>,
    watcher: FileWatcher,
    policy: WaitPolicy,
    simulator: Option<SimulationRunner>,
    run_second_push: bool,
}

impl PipelineDriver {
    /// Build a driver from validated configuration.
    ///
    /// `running` is the shutdown flag observed while waiting for artifacts.
    /// Relative paths are anchored to the current directory here, before any
    /// run can hand the working directory to the simulator.
    pub fn from_config(config: &PipelineConfig, running: Option<Arc<AtomicBool>>) -> Result<Self> {
        config.validate()?;
        let config = &config.anchored()?;
        let mut watcher = FileWatcher::system();
        if let Some(running) = running {
            watcher = watcher.with_running_flag(running);
        }
        let simulator = if config.simulator.enabled {
            Some(config.simulator.runner()?)
        } else {
            None
        };

        Ok(Self {
            store: HeightmapStore::new(config.layout()),
            reducer: PointCloudReducer::new(config.grid.reducer()),
            region: config.grid.region(),
            desired: config.desired,
            profile: config.profile(),
            optimizer: create_optimizer(&config.optimizer)?,
            watcher,
            policy: config.watch.policy()?,
            simulator,
            run_second_push: config.simulator.run_second_push,
        })
    }

    pub fn with_watcher(mut self, watcher: FileWatcher) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn ControlOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_simulator(mut self, simulator: Option<SimulationRunner>) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn store(&self) -> &HeightmapStore {
        &self.store
    }

    /// Run every stage for `pile_height`.
    pub fn run(&self, pile_height: PileHeight) -> Result<PipelineReport> {
        let first = RunIdentity::new(pile_height, PushSequence::first());
        let mut state = PipelineState::Init;
        log::info!("[{}] Starting with {}", first, self.optimizer.name());

        let (rows, cols) = (self.reducer.config().rows, self.reducer.config().cols);
        let desired = create_desired_heightmap(&self.desired, rows, cols)?;

        // Stage 1: fatal on error
        let initial_path = self.store.layout().initial_heightmap(pile_height);
        let initial = self.store.load(&initial_path)?;
        let first_commands = self.optimize_and_save(&first, &initial, &desired)?;
        self.transition(
            &first,
            &mut state,
            PipelineState::Opt1Done {
                commands: first_commands.clone(),
            },
        );

        let mut report = PipelineReport {
            identity: first.clone(),
            state: state.clone(),
            first_commands,
            intermediate_heightmap: None,
            second_commands: None,
            failure: None,
        };

        // Stage 2: recorded, never propagated
        match self.second_stage(&first, &desired, &mut state, &mut report) {
            Ok(()) => self.transition(&first, &mut state, PipelineState::Done),
            Err(e) => {
                log::error!(
                    "[{}] Error processing second part of the run (in {}): {}",
                    first,
                    state.name(),
                    e
                );
                self.transition(
                    &first,
                    &mut state,
                    PipelineState::Failed {
                        reason: e.to_string(),
                    },
                );
                report.failure = Some(e);
            }
        }
        report.state = state;
        Ok(report)
    }

    fn second_stage(
        &self,
        first: &RunIdentity,
        desired: &HeightMap,
        state: &mut PipelineState,
        report: &mut PipelineReport,
    ) -> Result<()> {
        if let Some(simulator) = &self.simulator {
            self.transition(first, state, PipelineState::Simulating);
            self.simulate(simulator, first);
        }

        let layout = self.store.layout();
        let directory = layout.point_cloud_dir(first);
        fs::create_dir_all(&directory)
            .map_err(|e| Error::storage(&directory, format!("Failed to create: {}", e)))?;
        self.transition(
            first,
            state,
            PipelineState::WaitArtifact {
                directory: directory.clone(),
            },
        );
        let cloud_path =
            self.watcher
                .await_artifact(&layout.point_cloud_matcher(), &directory, &self.policy)?;

        let cloud = PointCloud::load(&cloud_path)?;
        let intermediate = self.reducer.reduce(&cloud, &self.region)?;
        let heightmap = self.store.path_for(first, STAGE_HEIGHTMAP);
        self.store.save(&heightmap, &intermediate)?;
        report.intermediate_heightmap = Some(heightmap.clone());
        self.transition(first, state, PipelineState::Reduced { heightmap });

        let second = first.with_push(PushSequence::second());
        let commands = self.optimize_and_save(&second, &intermediate, desired)?;
        report.second_commands = Some(commands.clone());
        self.transition(first, state, PipelineState::Opt2Done { commands });

        if self.run_second_push
            && let Some(simulator) = &self.simulator
        {
            self.simulate(simulator, &second);
        }
        Ok(())
    }

    fn optimize_and_save(
        &self,
        id: &RunIdentity,
        initial: &HeightMap,
        desired: &HeightMap,
    ) -> Result<PathBuf> {
        let sequence = self.optimizer.optimize(initial, desired, &self.profile)?;
        let path = self.store.layout().control_commands(id);
        save_control_sequence(&path, &sequence)?;
        Ok(path)
    }

    /// Run the simulator; failure is logged and does not stop the run,
    /// since an operator may still supply the artifact.
    fn simulate(&self, simulator: &SimulationRunner, id: &RunIdentity) {
        if let Err(e) = simulator.run(id) {
            log::warn!("[{}] {}; still waiting for its output", id, e);
        }
    }

    fn transition(&self, id: &RunIdentity, state: &mut PipelineState, next: PipelineState) {
        debug_assert!(
            state.can_transition_to(&next),
            "illegal transition {} -> {}",
            state.name(),
            next.name()
        );
        log::info!("[{}] {} -> {}", id, state.name(), next.name());
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ControlSequence;
    use crate::io::load_control_sequence;
    use crate::watch::ManualClock;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Returns a fixed sequence so driver tests stay fast.
    struct FixedOptimizer;

    impl ControlOptimizer for FixedOptimizer {
        fn optimize(
            &self,
            initial: &HeightMap,
            _desired: &HeightMap,
            profile: &OptimizerProfile,
        ) -> Result<ControlSequence> {
            let v = initial.max();
            ControlSequence::from_flat(&vec![v; profile.actuators * 2], profile.actuators)
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn config(root: &TempDir) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths.data_root = root.path().to_path_buf();
        config.grid.rows = 20;
        config.grid.cols = 10;
        config.watch.timeout_secs = 10.0;
        config.watch.poll_interval_secs = 1.0;
        config.watch.settle_secs = 0.0;
        config
    }

    fn driver(config: &PipelineConfig, clock: &ManualClock) -> PipelineDriver {
        PipelineDriver::from_config(config, None)
            .unwrap()
            .with_optimizer(Box::new(FixedOptimizer))
            .with_watcher(FileWatcher::new(Arc::new(clock.clone())))
    }

    fn pile() -> PileHeight {
        PileHeight::new(0.37).unwrap()
    }

    fn seed_initial(driver: &PipelineDriver) {
        let path = driver.store().layout().initial_heightmap(pile());
        driver
            .store()
            .save(&path, &HeightMap::from_fn(20, 10, |_, _| 0.25))
            .unwrap();
    }

    #[test]
    fn test_relative_paths_are_anchored_at_construction() {
        let mut config = PipelineConfig::default();
        config.paths.data_root = PathBuf::from("relative-data");
        let driver = PipelineDriver::from_config(&config, None).unwrap();

        let cwd = crate::sim::workdir::current_dir().unwrap();
        assert_eq!(
            driver.store().layout().data_root(),
            cwd.join("relative-data")
        );
    }

    #[test]
    fn test_missing_initial_map_is_fatal() {
        let root = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let driver = driver(&config(&root), &clock);

        let err = driver.run(pile()).unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert!(!driver.store().layout().control_commands_dir().exists());
    }

    #[test]
    fn test_full_run() {
        let root = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let driver = driver(&config(&root), &clock);
        seed_initial(&driver);

        let first = RunIdentity::new(pile(), PushSequence::first());
        let cloud = driver.store().layout().point_cloud_dir(&first).join("fluid0.csv");
        clock.schedule_at(Duration::from_secs(3), move || {
            fs::write(cloud, "x,y,z\n1.0,0.0,0.5\n6.0,0.0,0.9\n").unwrap();
        });

        let report = driver.run(pile()).unwrap();
        assert!(report.is_complete(), "{:?}", report.failure);
        assert_eq!(report.state, PipelineState::Done);

        let first_cmds = load_control_sequence(&report.first_commands).unwrap();
        assert_eq!(first_cmds.flatten(), vec![0.25; 4]);

        // Only the in-region point survives, so the max height is 0.5
        let mid = driver
            .store()
            .load(report.intermediate_heightmap.as_ref().unwrap())
            .unwrap();
        assert_eq!(mid.shape(), (20, 10));
        assert_eq!(mid.max(), 0.5);

        let second_path = report.second_commands.unwrap();
        assert!(second_path.ends_with("control_commands/0.370000_secondpush.txt"));
        assert_eq!(
            load_control_sequence(&second_path).unwrap().flatten(),
            vec![0.5; 4]
        );
    }

    #[test]
    fn test_timeout_keeps_first_push() {
        let root = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let driver = driver(&config(&root), &clock);
        seed_initial(&driver);

        let report = driver.run(pile()).unwrap();
        assert!(matches!(report.state, PipelineState::Failed { .. }));
        assert!(matches!(report.failure, Some(Error::ArtifactTimeout { .. })));
        assert!(report.first_commands.exists());
        assert!(report.intermediate_heightmap.is_none());
        assert!(report.second_commands.is_none());
    }

    #[test]
    fn test_empty_filter_fails_stage_two() {
        let root = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let driver = driver(&config(&root), &clock);
        seed_initial(&driver);

        let first = RunIdentity::new(pile(), PushSequence::first());
        let dir = driver.store().layout().point_cloud_dir(&first);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("fluid0.csv"), "x,y,z\n6.0,0.0,0.5\n").unwrap();

        let report = driver.run(pile()).unwrap();
        assert!(matches!(
            report.failure,
            Some(Error::EmptyFilterResult { total: 1 })
        ));
        assert!(report.intermediate_heightmap.is_none());
    }

    #[test]
    fn test_simulator_failure_does_not_block() {
        let root = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let mut cfg = config(&root);
        cfg.simulator.enabled = true;
        cfg.simulator.executable = root.path().join("missing-simulator");
        cfg.simulator.working_dir = root.path().to_path_buf();
        let driver = driver(&cfg, &clock);
        seed_initial(&driver);

        let first = RunIdentity::new(pile(), PushSequence::first());
        let dir = driver.store().layout().point_cloud_dir(&first);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("fluid0.csv"), "x,y,z\n1.0,0.0,0.5\n").unwrap();

        let report = driver.run(pile()).unwrap();
        assert!(report.is_complete(), "{:?}", report.failure);
    }
}
