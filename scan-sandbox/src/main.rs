use log::*;
use scan_core::{Detection2D, ReconstructionError, Result, ViewPrediction};
use scan_furniture::{FurniturePipeline, LocalizationSettings};
use scan_reconstruction::{
    export::write_points_ply, load_reference_cloud, JobStatus, JobWorkspace, ReconstructionJob,
    ReconstructionSettings,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(StructOpt, Clone)]
#[structopt(
    name = "scan-sandbox",
    about = "A tool for running room scan reconstruction and furniture localization"
)]
enum Opt {
    /// Turns an oracle prediction into level-of-detail assets.
    Reconstruct {
        /// The oracle prediction, `bincode` or `.json` encoded `scan_core::ViewPrediction`.
        #[structopt(short, long)]
        prediction: PathBuf,
        /// Directory under which the job directory is created.
        #[structopt(short, long, default_value = "jobs")]
        jobs: PathBuf,
        /// Must not name an existing job directory.
        #[structopt(long)]
        job_id: String,
        /// The file where settings are specified.
        ///
        /// This is in the format of `scan_reconstruction::ReconstructionSettings`.
        #[structopt(short, long, default_value = "reconstruction-settings.json")]
        settings: PathBuf,
    },
    /// Places 2D furniture detections inside a reference scan.
    Localize {
        /// The oracle prediction the detections were made on.
        #[structopt(short, long)]
        prediction: PathBuf,
        /// JSON list of `scan_core::Detection2D`.
        #[structopt(short, long)]
        detections: PathBuf,
        /// A `.glb` or `.ply` scan of the room. Without it detections are lifted from depth.
        #[structopt(short, long)]
        reference: Option<PathBuf>,
        /// The file where settings are specified.
        ///
        /// This is in the format of `scan_furniture::LocalizationSettings`.
        #[structopt(short, long, default_value = "localization-settings.json")]
        settings: PathBuf,
        /// Output JSON file for the located objects. Printed to stdout when absent.
        #[structopt(short, long)]
        output: Option<PathBuf>,
    },
    /// Converts a `.glb` or `.ply` cloud into a binary PLY file.
    Convert {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
}

fn main() {
    pretty_env_logger::init_timed();
    let result = match Opt::from_args() {
        Opt::Reconstruct {
            prediction,
            jobs,
            job_id,
            settings,
        } => reconstruct(&prediction, &jobs, &job_id, &settings),
        Opt::Localize {
            prediction,
            detections,
            reference,
            settings,
            output,
        } => localize(
            &prediction,
            &detections,
            reference.as_deref(),
            &settings,
            output.as_deref(),
        ),
        Opt::Convert { input, output } => convert(&input, &output),
    };
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn reconstruct(prediction: &Path, jobs: &Path, job_id: &str, settings: &Path) -> Result<()> {
    let settings: ReconstructionSettings = load_settings(settings);
    let prediction = load_prediction(prediction)?;
    let workspace = JobWorkspace::create(jobs, job_id)?;
    info!("writing job output to {}", workspace.dir().display());

    let handle = ReconstructionJob::new(workspace, settings).spawn(prediction)?;
    for update in handle.progress.iter() {
        info!(
            "[{:>5.1}%] {}: {}",
            update.progress, update.stage, update.message
        );
    }
    let result = handle.join().map_err(|_| {
        ReconstructionError::InvalidInput("reconstruction worker panicked".to_string())
    })?;
    print_json(&result)?;
    if result.status != JobStatus::Completed {
        // The job already logged its error.
        std::process::exit(1);
    }
    Ok(())
}

fn localize(
    prediction: &Path,
    detections: &Path,
    reference: Option<&Path>,
    settings: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let settings: LocalizationSettings = load_settings(settings);
    let prediction = load_prediction(prediction)?;
    let detections: Vec<Detection2D> = serde_json::from_reader(BufReader::new(
        File::open(detections)?,
    ))
    .map_err(|e| ReconstructionError::InvalidInput(e.to_string()))?;
    let reference = reference
        .map(|path| {
            load_reference_cloud(
                path,
                settings.reference_max_points,
                settings.furniture.seed,
            )
        })
        .transpose()?;

    let result = FurniturePipeline::new(settings).run(&prediction, &detections, reference.as_ref())?;
    for object in &result.objects {
        info!(
            "{} at {:?} (confidence {:.2})",
            object.label,
            object.center.coords.as_slice(),
            object.confidence
        );
    }
    match output {
        Some(path) => {
            serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), &result)
                .map_err(|e| ReconstructionError::Serialization(e.to_string()))?;
            info!("wrote {} objects to {}", result.objects.len(), path.display());
            Ok(())
        }
        None => print_json(&result),
    }
}

fn convert(input: &Path, output: &Path) -> Result<()> {
    let cloud = load_reference_cloud(input, usize::MAX, 0)?;
    write_points_ply(&cloud, BufWriter::new(File::create(output)?))?;
    info!("wrote {} points to {}", cloud.len(), output.display());
    Ok(())
}

fn load_settings<T: DeserializeOwned + Default>(path: &Path) -> T {
    let settings = File::open(path)
        .ok()
        .and_then(|file| serde_json::from_reader(BufReader::new(file)).ok());
    if settings.is_some() {
        info!("loaded existing settings");
    } else {
        info!("used default settings");
    }
    settings.unwrap_or_default()
}

/// Reads a prediction as JSON when the extension says so, as `bincode` otherwise.
fn load_prediction(path: &Path) -> Result<ViewPrediction> {
    let reader = BufReader::new(File::open(path)?);
    let prediction: ViewPrediction = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_reader(reader)
            .map_err(|e| ReconstructionError::InvalidInput(e.to_string()))?
    } else {
        bincode::deserialize_from(reader)
            .map_err(|e| ReconstructionError::InvalidInput(e.to_string()))?
    };
    info!(
        "loaded prediction with {} views from {}",
        prediction.len(),
        path.display()
    );
    Ok(prediction)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ReconstructionError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
