use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::Vector3;
use serde::Serialize;

use orbitsim::bodies::{BodyId, BodyRegistry};
use orbitsim::ephemeris::StateVectorCalculator;
use orbitsim::maneuver::{hohmann, HohmannTransfer, ManeuverId};
use orbitsim::propagation::{
    ground_track, GroundTrackPoint, OrbitalState, PropagationRequest, PropagationResult, Propagator,
    SimulationSettings, SoiTransition, SpacecraftProperties, SpacecraftState,
};
use orbitsim::{Diagnostic, Epoch, Satellite, SatelliteId, Simulation};

const PROGRESS_TEMPLATE: &str = "{elapsed_precise} {bar:40.cyan/blue} {pos}/{len} {percent}% ETA {eta_precise}";

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::with_template(PROGRESS_TEMPLATE)
            .context("Invalid progress template")?
            .progress_chars("##-"),
    );
    Ok(progress)
}

fn parse_vector(text: &str) -> Result<Vector3<f64>, String> {
    let components = text
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|e| format!("'{}': {}", c.trim(), e)))
        .collect::<Result<Vec<_>, _>>()?;
    match components.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(format!("expected three comma-separated values, got {}", components.len())),
    }
}

fn parse_epoch(text: &str) -> Result<Epoch, String> {
    text.parse::<Epoch>().map_err(|e| e.to_string())
}

/// Write pretty JSON to `path`, or to stdout when no path is given
fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
            serde_json::to_writer_pretty(file, value)?;
            log::info!("Wrote {:?}", path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, value)?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

/// Initial conditions shared by `propagate` and `simulate`
#[derive(Args, Debug, Clone)]
pub struct SatelliteArgs {
    /// Central body id or name
    #[arg(long, default_value = "399")]
    pub central: String,
    /// Position relative to the central body, km (x,y,z)
    #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
    pub position: Vector3<f64>,
    /// Velocity relative to the central body, km/s (vx,vy,vz)
    #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
    pub velocity: Vector3<f64>,
    /// Spacecraft mass in kg
    #[arg(long, default_value_t = 100.0)]
    pub mass: f64,
    /// Cross-sectional area in m²
    #[arg(long, default_value_t = 1.0)]
    pub area: f64,
    /// Drag coefficient
    #[arg(long, default_value_t = 2.2)]
    pub cd: f64,
    /// Ballistic coefficient in kg/m², overrides mass/area/cd for drag
    #[arg(long)]
    pub ballistic: Option<f64>,
    /// Start time (RFC 3339), defaults to the catalog epoch
    #[arg(long, value_parser = parse_epoch)]
    pub time: Option<Epoch>,
}

impl SatelliteArgs {
    fn central_body(&self, registry: &BodyRegistry) -> Result<BodyId> {
        registry
            .find(&self.central)
            .map(|b| b.id)
            .ok_or_else(|| anyhow!("unknown central body '{}'", self.central))
    }

    fn properties(&self) -> SpacecraftProperties {
        let properties = SpacecraftProperties::new(self.mass, self.area, self.cd);
        match self.ballistic {
            Some(b) => properties.with_ballistic_coefficient(b),
            None => properties,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BodiesArgs {
    /// Time to position the bodies at (RFC 3339), defaults to the catalog epoch
    #[arg(long, value_parser = parse_epoch)]
    pub time: Option<Epoch>,
}

pub fn run_bodies(args: BodiesArgs, mut registry: BodyRegistry, settings: &SimulationSettings) -> Result<()> {
    let epoch = args.time.unwrap_or_else(|| registry.catalog_epoch());
    let calculator = StateVectorCalculator::new(settings.fallback);
    let report = calculator.update_all(&mut registry, epoch);
    for diagnostic in &report.diagnostics {
        log::warn!("{}", diagnostic);
    }

    println!("Bodies at {} ({} positioned)", epoch, report.resolved);
    println!(
        "{:>6}  {:<24} {:<12} {:>16} {:>14} {:<20} {:>16}",
        "id", "name", "kind", "GM (km³/s²)", "SOI (km)", "source", "distance (km)"
    );
    for body in registry.iter() {
        let soi = match registry.soi_radius(body.id) {
            Some(r) if r.is_infinite() => "inf".to_string(),
            Some(r) => format!("{:.4e}", r),
            None => "-".to_string(),
        };
        let distance = registry
            .state(body.id)
            .map(|s| format!("{:.4e}", s.radius()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6}  {:<24} {:<12} {:>16.6e} {:>14} {:<20} {:>16}",
            body.id,
            body.name,
            body.kind.name(),
            body.gm,
            soi,
            calculator.select_source(&registry, body.id, epoch).name(),
            distance
        );
    }
    Ok(())
}

#[derive(Args, Debug, Clone)]
pub struct PropagateArgs {
    #[command(flatten)]
    pub satellite: SatelliteArgs,
    /// Propagation span in seconds
    #[arg(long, default_value_t = 86_400.0)]
    pub duration: f64,
    /// Integration step in seconds, defaults to the configured step size
    #[arg(long)]
    pub step: Option<f64>,
    /// Include the ground track in the output
    #[arg(long)]
    pub ground_track: bool,
    /// Output JSON file path (stdout when omitted)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PropagationReport {
    generated_at: String,
    start_time_utc: String,
    duration: f64,
    step: f64,
    integrator: &'static str,
    forces: Vec<&'static str>,
    result: PropagationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    ground_track: Option<Vec<GroundTrackPoint>>,
}

pub fn run_propagate(args: PropagateArgs, mut registry: BodyRegistry, settings: &SimulationSettings) -> Result<()> {
    let epoch = args.satellite.time.unwrap_or_else(|| registry.catalog_epoch());
    let central = args.satellite.central_body(&registry)?;
    let propagator = Propagator::from_settings(settings);
    propagator.calculator().update_all(&mut registry, epoch);

    let initial = SpacecraftState::new(
        OrbitalState::new(args.satellite.position, args.satellite.velocity, epoch),
        central,
        args.satellite.properties(),
    );
    let step = args.step.unwrap_or(settings.propagator.step_size);
    let request = PropagationRequest::new(initial, args.duration).with_step(step);

    log::info!(
        "Propagating around {} for {} s from {}",
        registry.name_of(central),
        args.duration,
        epoch
    );
    let mut trajectory = propagator.trajectory(request, &registry)?;
    let progress = progress_bar(trajectory.expected_steps() as u64)?;

    let mut samples = Vec::new();
    while let Some(sample) = trajectory.next() {
        samples.push(sample);
        progress.set_position(trajectory.steps() as u64);
    }
    progress.finish_and_clear();

    let result = trajectory.into_result(samples);
    for diagnostic in &result.diagnostics {
        log::warn!("{}", diagnostic);
    }
    for transition in &result.soi_transitions {
        log::info!(
            "SOI change at {}: {} -> {}",
            transition.time,
            registry.name_of(transition.from),
            registry.name_of(transition.to)
        );
    }

    let track = args.ground_track.then(|| ground_track(&result.samples, &registry));
    let report = PropagationReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        start_time_utc: epoch.to_string(),
        duration: args.duration,
        step,
        integrator: propagator.integrator_name(),
        forces: propagator.forces().model_names(),
        result,
        ground_track: track,
    };
    write_json(&report, args.output.as_deref())
}

#[derive(Args, Debug, Clone)]
pub struct HohmannArgs {
    /// Gravitational parameter in km³/s²
    #[arg(long, default_value_t = 398_600.4418)]
    pub mu: f64,
    /// Initial circular orbit radius in km
    #[arg(long)]
    pub r1: f64,
    /// Target circular orbit radius in km
    #[arg(long)]
    pub r2: f64,
}

pub fn run_hohmann(args: HohmannArgs) -> Result<()> {
    let transfer: HohmannTransfer = hohmann(args.mu, args.r1, args.r2)?;
    write_json(&transfer, None)
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub satellite: SatelliteArgs,
    /// Real time to simulate in seconds
    #[arg(long, default_value_t = 60.0)]
    pub duration: f64,
    /// Time warp multiplier
    #[arg(long, default_value_t = 100.0)]
    pub warp: f64,
    /// Real seconds per tick
    #[arg(long, default_value_t = 1.0 / 60.0)]
    pub tick: f64,
    /// Plan a Hohmann transfer to this radius (km), starting at the first tick
    #[arg(long)]
    pub target_radius: Option<f64>,
    /// Output JSON file path (stdout when omitted)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SimulationReport<'a> {
    generated_at: String,
    start_time_utc: String,
    end_time_utc: String,
    ticks: usize,
    substeps: usize,
    satellite: Option<&'a Satellite>,
    soi_events: &'a [(SatelliteId, SoiTransition)],
    executed_maneuvers: Vec<(SatelliteId, ManeuverId)>,
    diagnostics: Vec<Diagnostic>,
}

pub fn run_simulate(args: SimulateArgs, registry: BodyRegistry, settings: SimulationSettings) -> Result<()> {
    if !(args.tick.is_finite() && args.tick > 0.0) {
        bail!("tick must be > 0");
    }
    if !(args.duration.is_finite() && args.duration >= 0.0) {
        bail!("duration must be >= 0");
    }

    let epoch = args.satellite.time.unwrap_or_else(|| registry.catalog_epoch());
    let central = args.satellite.central_body(&registry)?;
    let mut sim = Simulation::new(registry, settings, epoch);
    let id = sim.add_satellite(
        "satellite",
        central,
        args.satellite.position,
        args.satellite.velocity,
        args.satellite.properties(),
    )?;
    if let Some(radius) = args.target_radius {
        let transfer = sim.plan_hohmann(id, radius, epoch)?;
        log::info!(
            "Planned Hohmann transfer to {} km: {:.4} km/s over {:.0} s",
            radius,
            transfer.total,
            transfer.transfer_time
        );
    }

    let ticks = (args.duration / args.tick).ceil() as usize;
    let progress = progress_bar(ticks as u64)?;
    let mut substeps = 0;
    let mut executed_maneuvers = Vec::new();
    let mut diagnostics = Vec::new();
    let mut elapsed = 0.0;
    for _ in 0..ticks {
        let real_dt = args.tick.min(args.duration - elapsed);
        elapsed += real_dt;
        let report = sim.tick(real_dt, args.warp)?;
        substeps += report.substeps;
        executed_maneuvers.extend(report.executed_maneuvers);
        for diagnostic in report.diagnostics {
            if !diagnostics.contains(&diagnostic) {
                log::warn!("{}", diagnostic);
                diagnostics.push(diagnostic);
            }
        }
        if !report.halted.is_empty() {
            log::warn!("Satellite halted at {}", sim.time());
            break;
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    for (_, transition) in sim.soi_events() {
        log::info!(
            "SOI change at {}: {} -> {}",
            transition.time,
            sim.registry().name_of(transition.from),
            sim.registry().name_of(transition.to)
        );
    }

    let report = SimulationReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        start_time_utc: epoch.to_string(),
        end_time_utc: sim.time().to_string(),
        ticks,
        substeps,
        satellite: sim.satellite(id),
        soi_events: sim.soi_events(),
        executed_maneuvers,
        diagnostics,
    };
    write_json(&report, args.output.as_deref())
}
