// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses command line arguments with clap and hands off to
// Layer 2 (application). Three commands are supported:
//   1. `train`   — fine-tune on a folder of labelled images
//   2. `export`  — re-export the latest checkpoint for TF.js
//   3. `predict` — classify one image
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ExportArgs, PredictArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "waste-sort",
    version,
    about = "Fine-tune a MobileNetV2 waste classifier and export it for TensorFlow.js."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. Routes only, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Export(args)  => run_export(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on images in: {}", args.data_dir);

    let history = TrainUseCase::new(args.into()).execute()?;
    if let Some(last) = history.last() {
        println!(
            "Final: accuracy={:.1}% | val_accuracy={:.1}%",
            last.train_acc * 100.0,
            last.val_acc * 100.0
        );
    }
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    use crate::application::export_use_case::ExportUseCase;

    ExportUseCase::new(args.checkpoint_dir, args.output_dir.clone(), args.cpu).execute()?;
    println!("Model saved in TensorFlow.js format to '{}'", args.output_dir);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case   = PredictUseCase::new(&args.checkpoint_dir, args.cpu)?;
    let prediction = use_case.predict(&args.image)?;

    println!("\nPrediction: {} ({:.1}%)", prediction.label, prediction.confidence * 100.0);
    for (name, p) in use_case.class_names().iter().zip(&prediction.probabilities) {
        println!("  {:<10} {:>6.2}%", name, p * 100.0);
    }
    Ok(())
}
