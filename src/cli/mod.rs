// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap, picks the Burn backend for the requested device, hands
// off to Layer 2 and prints the human-readable results.
//
// Backends:
//   --device cpu   → NdArray  (Autodiff<NdArray> for training)
//   --device wgpu  → Wgpu     (Autodiff<Wgpu> for training)
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{
    ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu,
};
use clap::Parser;
use commands::{CompileArgs, Commands, DeviceKind, FinetuneArgs, GenerateArgs, InitBaseArgs};

use crate::application::{
    compile_use_case::CompileUseCase,
    config::FinetuneConfig,
    finetune_use_case::FinetuneUseCase,
    generate_use_case::GenerateUseCase,
    init_base_use_case::InitBaseUseCase,
};

#[derive(Parser, Debug)]
#[command(
    name = "propfit",
    version = "0.1.0",
    about = "Fine-tune low-rank adapters for proposition extraction, then generate with them."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Finetune(args) => run_finetune(args),
            Commands::Generate(args) => run_generate(args),
            Commands::Compile(args)  => run_compile(args),
            Commands::InitBase(args) => run_init_base(args),
        }
    }
}

fn run_finetune(args: FinetuneArgs) -> Result<()> {
    let device = args.device;
    let use_case = FinetuneUseCase::new(FinetuneConfig::try_from(args)?);

    println!("Starting fine-tuning...");
    let report = match device {
        DeviceKind::Cpu  => use_case.execute::<Autodiff<NdArray>>(&NdArrayDevice::default())?,
        DeviceKind::Wgpu => use_case.execute::<Autodiff<Wgpu>>(&WgpuDevice::default())?,
    };

    println!("{}", report.parameters);
    println!(
        "Loss {:.4} at step {} (last step {:.4}, {:.2} epochs over {} examples)",
        report.summary.final_loss,
        report.summary.final_step,
        report.summary.last_loss,
        report.summary.epochs,
        report.examples,
    );
    println!("\n--- Smoke test output ---\n{}\n", report.probe.text);
    println!("Model saved to '{}'", report.artifacts.dir.display());
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let device = args.device;
    let use_case = GenerateUseCase::new(args.into());

    let result = match device {
        DeviceKind::Cpu  => use_case.execute::<NdArray>(&NdArrayDevice::default())?,
        DeviceKind::Wgpu => use_case.execute::<Wgpu>(&WgpuDevice::default())?,
    };

    println!("{}", result.text);
    if !result.stopped_on_eos {
        tracing::warn!("Generation hit the token budget before closing its turn");
    }
    Ok(())
}

fn run_compile(args: CompileArgs) -> Result<()> {
    let out = args.out.clone();
    let report = CompileUseCase::new(args.into()).execute()?;

    print!("{report}");
    println!("Saved to: {}", out.display());
    Ok(())
}

fn run_init_base(args: InitBaseArgs) -> Result<()> {
    let device = args.device;
    let out = args.out.clone();
    let use_case = InitBaseUseCase::new(args.into());

    let cfg = match device {
        DeviceKind::Cpu  => use_case.execute::<NdArray>(&NdArrayDevice::default())?,
        DeviceKind::Wgpu => use_case.execute::<Wgpu>(&WgpuDevice::default())?,
    };

    println!(
        "Base model written to '{}' ({} layers, d_model {}, vocab {})",
        out.display(),
        cfg.num_layers,
        cfg.d_model,
        cfg.vocab_size
    );
    Ok(())
}
