use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use image_processor_core::descriptor::{image_processor_descriptor, DeploymentDescriptor};
use image_processor_core::provisioning::{ChangeAction, StackEnvironment, StackPlan, StackState};
use image_processor_core::template::render_template_json;
use image_processor_core::validation::validate_descriptor;
use serde_json::Value;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const DEFAULT_TEMPLATE_PATH: &str = "infra/image_processor/template.json";
const DIST_DIR: &str = "infra/image_processor/dist";
const ARTIFACT_NAME: &str = "image_processor.zip";
const LAMBDA_BINARY: &str = "image_processor";

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the image processor workspace",
    long_about = "Renders and checks the deployment template, previews the\n\
                  provisioning plan, packages the Lambda artifact and runs CI checks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the descriptor and write the deployment template
    Template {
        /// Descriptor JSON overriding the built-in image processor descriptor
        #[arg(long)]
        descriptor: Option<PathBuf>,
        /// Output file path
        #[arg(long, default_value = DEFAULT_TEMPLATE_PATH)]
        output: PathBuf,
    },
    /// Report every descriptor violation without writing anything
    Validate {
        #[arg(long)]
        descriptor: Option<PathBuf>,
    },
    /// Print the provisioning order, and the change set against a previous template
    Plan {
        #[arg(long)]
        descriptor: Option<PathBuf>,
        /// Previously deployed template to diff against
        #[arg(long)]
        previous: Option<PathBuf>,
        #[arg(long, default_value = "image-processor")]
        stack_name: String,
        #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
        region: String,
        #[arg(long, env = "AWS_ACCOUNT_ID", default_value = "000000000000")]
        account_id: String,
    },
    /// Build the Lambda binary and zip it as `bootstrap`
    Package {
        /// Compilation target triple for the Lambda binary
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for the binary
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Build without libheif; HEIC uploads then fail to convert
        #[arg(long)]
        without_heic: bool,
    },
    /// Run CI checks
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Render and validate the template
    Template,
    /// Run check + template
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn fail(message: &str) -> ! {
    eprintln!("error: {message}");
    exit(1);
}

// ── descriptor and template ────────────────────────────────────────

fn load_descriptor(path: Option<&Path>) -> Result<DeploymentDescriptor, String> {
    let Some(path) = path else {
        return Ok(image_processor_descriptor());
    };
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("failed to read descriptor '{}': {error}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("invalid descriptor '{}': {error}", path.display()))
}

fn write_template(descriptor: &DeploymentDescriptor, output: &Path) -> Result<(), String> {
    let rendered = render_template_json(descriptor).map_err(|error| error.to_string())?;
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create '{}': {error}", parent.display()))?;
    }
    fs::write(output, format!("{rendered}\n"))
        .map_err(|error| format!("failed to write '{}': {error}", output.display()))
}

fn read_template(path: &Path) -> Result<Value, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("failed to read template '{}': {error}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("invalid template '{}': {error}", path.display()))
}

fn plan_template(descriptor: &DeploymentDescriptor) -> Result<StackPlan, String> {
    let rendered = render_template_json(descriptor).map_err(|error| error.to_string())?;
    let template: Value = serde_json::from_str(&rendered)
        .map_err(|error| format!("rendered template is not valid JSON: {error}"))?;
    StackPlan::from_template(&template).map_err(|error| error.to_string())
}

fn plan_report(
    plan: &StackPlan,
    previous: Option<&StackPlan>,
    environment: StackEnvironment,
) -> Result<Vec<String>, String> {
    let mut lines: Vec<String> = plan
        .ordered_resources()
        .enumerate()
        .map(|(index, resource)| {
            format!(
                "{:>2}. {} ({})",
                index + 1,
                resource.logical_id,
                resource.resource_type
            )
        })
        .collect();
    lines.extend(
        plan.outputs()
            .map(|output| format!("    output {}", output.logical_id)),
    );

    let mut state = StackState::new(environment);
    if let Some(previous) = previous {
        state.apply(previous).map_err(|error| error.to_string())?;
    }
    let change_set = state.change_set(plan);
    lines.push(String::new());
    for change in &change_set.changes {
        lines.push(format!("{:?} {}", change.action, change.logical_id));
    }
    lines.push(format!(
        "{} to create, {} to update, {} to delete, {} unchanged",
        change_set.count(ChangeAction::Create),
        change_set.count(ChangeAction::Update),
        change_set.count(ChangeAction::Delete),
        change_set.count(ChangeAction::Unchanged),
    ));
    Ok(lines)
}

// ── packaging ──────────────────────────────────────────────────────

fn package_lambda(target: &str, profile: BuildProfile, with_heic: bool) {
    ensure_rust_target_installed(target);

    step("Build image processor lambda binary");
    let mut cargo_args = vec![
        "build",
        "-p",
        "image_processor_lambda",
        "--target",
        target,
        "--bin",
        LAMBDA_BINARY,
    ];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    if with_heic {
        cargo_args.extend(["--features", "heic"]);
    }
    run_cargo(&cargo_args);

    step("Package lambda zip artifact");
    let target_dir = Path::new("target").join(target).join(profile.dir_name());
    let dist_dir = Path::new(DIST_DIR);
    fs::create_dir_all(dist_dir).expect("failed to create lambda dist directory");

    let zip_path = dist_dir.join(ARTIFACT_NAME);
    if let Err(error) = package_lambda_zip(&target_dir.join(LAMBDA_BINARY), &zip_path) {
        fail(&error);
    }
    eprintln!("\nPackaged artifact:\n- {}", zip_path.display());
}

fn ensure_rust_target_installed(target: &str) {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if output.status.success() && !installed.lines().any(|line| line.trim() == target) {
        fail(&format!(
            "rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo run -p xtask -- package`"
        ));
    }
}

fn package_lambda_zip(binary_path: &Path, zip_path: &Path) -> Result<(), String> {
    let binary = fs::read(binary_path).map_err(|error| {
        format!(
            "expected lambda binary at '{}': {error}",
            binary_path.display()
        )
    })?;
    let file = fs::File::create(zip_path)
        .map_err(|error| format!("failed to create '{}': {error}", zip_path.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .map_err(|error| format!("failed to start bootstrap entry: {error}"))?;
    zip.write_all(&binary)
        .map_err(|error| format!("failed to write bootstrap entry: {error}"))?;
    zip.finish()
        .map_err(|error| format!("failed to finish lambda zip: {error}"))?;
    Ok(())
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test image_processor_core");
    run_cargo(&["test", "-p", "image_processor_core"]);

    step("Test image_processor_lambda");
    run_cargo(&["test", "-p", "image_processor_lambda"]);

    step("Test xtask");
    run_cargo(&["test", "-p", "xtask"]);
}

fn ci_template() {
    step("Render and plan deployment template");
    let descriptor = image_processor_descriptor();
    if let Err(error) = plan_template(&descriptor) {
        fail(&error);
    }
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Template { descriptor, output } => {
            let descriptor = load_descriptor(descriptor.as_deref()).unwrap_or_else(|e| fail(&e));
            write_template(&descriptor, &output).unwrap_or_else(|e| fail(&e));
            eprintln!("Wrote {}", output.display());
        }
        Commands::Validate { descriptor } => {
            let descriptor = load_descriptor(descriptor.as_deref()).unwrap_or_else(|e| fail(&e));
            let errors = validate_descriptor(&descriptor);
            if errors.is_empty() {
                eprintln!("Descriptor is valid.");
                return;
            }
            for error in &errors {
                eprintln!("- {error}");
            }
            fail(&format!("{} validation error(s)", errors.len()));
        }
        Commands::Plan {
            descriptor,
            previous,
            stack_name,
            region,
            account_id,
        } => {
            let descriptor = load_descriptor(descriptor.as_deref()).unwrap_or_else(|e| fail(&e));
            let plan = plan_template(&descriptor).unwrap_or_else(|e| fail(&e));
            let previous = previous
                .as_deref()
                .map(|path| {
                    read_template(path).and_then(|template| {
                        StackPlan::from_template(&template).map_err(|error| error.to_string())
                    })
                })
                .transpose()
                .unwrap_or_else(|e| fail(&e));
            let environment = StackEnvironment {
                stack_name,
                partition: "aws".to_string(),
                region,
                account_id,
            };
            let lines =
                plan_report(&plan, previous.as_ref(), environment).unwrap_or_else(|e| fail(&e));
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Package {
            target,
            profile,
            without_heic,
        } => {
            package_lambda(&target, profile, !without_heic);
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Template => ci_template(),
                CiJob::All => {
                    ci_check();
                    ci_template();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
