use std::error::Error;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use cooklang_reel::{
    AlignmentOutcome, AppConfig, Caller, Comparison, CustomPrompt, Decision, ImportRequest,
    JsonFileStore, PromptPolicy, Recipe, RecipeId, RecipeService, Step,
};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Act as this user; without it, requests are anonymous
    #[arg(long, global = true)]
    user: Option<String>,

    /// Recipe store file (overrides `store.path` from the config)
    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract a recipe from a caption, align it to its video and save it
    Import(ImportArgs),
    /// Print a stored recipe
    Show {
        id: RecipeId,
    },
    /// List recipes imported by --user, newest first
    List,
    /// Re-analyze the video of a recipe and review the new timings
    Reanalyze(ReanalyzeArgs),
    /// Set the video range of one step by hand
    SetTiming(SetTimingArgs),
    /// Restore the steps captured when the recipe was first imported
    Reset {
        id: RecipeId,
    },
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Link to the social media post (dedup key)
    #[arg(long)]
    url: String,

    /// Caption text of the post
    #[arg(long, required_unless_present = "caption_file")]
    caption: Option<String>,

    /// Read the caption from a file instead
    #[arg(long, conflicts_with = "caption")]
    caption_file: Option<String>,

    /// Direct URL of the video file
    #[arg(long)]
    video: Option<String>,

    #[arg(long)]
    thumbnail: Option<String>,
}

#[derive(Debug, Args)]
struct ReanalyzeArgs {
    id: RecipeId,

    /// strict or tolerant
    #[arg(long, default_value = "tolerant")]
    policy: String,

    /// Send this prompt verbatim instead of a built-in policy
    #[arg(long)]
    prompt: Option<String>,

    /// Apply the new timings without asking
    #[arg(long, conflicts_with = "discard")]
    apply: bool,

    /// Discard the new timings without asking
    #[arg(long)]
    discard: bool,
}

#[derive(Debug, Args)]
struct SetTimingArgs {
    id: RecipeId,

    /// Order of the step to change
    #[arg(long)]
    step: u32,

    /// Start, in seconds; omit to clear
    #[arg(long)]
    start: Option<f64>,

    /// End, in seconds; omit to clear
    #[arg(long)]
    end: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    debug!("{:?}", cli);

    let config = AppConfig::load()?;
    let store_path = cli.store.clone().unwrap_or_else(|| config.store.path.clone());
    let store = JsonFileStore::open(&store_path).await?;
    let service = RecipeService::builder()
        .from_config(&config)?
        .store(Arc::new(store))
        .build()?;

    let caller = match &cli.user {
        Some(user) => Caller::user(user.clone()),
        None => Caller::Anonymous,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Import(args) => import(&service, &caller, args, &cancel).await?,
        Command::Show { id } => print_recipe(&service.get_by_id(id).await?),
        Command::List => {
            for recipe in service.list_imported_by(&caller).await? {
                println!(
                    "{}  {}  {}",
                    recipe.id,
                    recipe.created_at.format("%Y-%m-%d %H:%M"),
                    recipe.title
                );
            }
        }
        Command::Reanalyze(args) => reanalyze(&service, &caller, args, &cancel).await?,
        Command::SetTiming(args) => {
            let recipe = service.get_by_id(args.id).await?;
            let steps = with_step_timing(recipe.steps, args.step, args.start, args.end)?;
            let updated = service.update_step_timings(args.id, &caller, steps).await?;
            print_recipe(&updated);
        }
        Command::Reset { id } => print_recipe(&service.reset_step_timings(id, &caller).await?),
    }

    Ok(())
}

async fn import(
    service: &RecipeService,
    caller: &Caller,
    args: ImportArgs,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let caption = match (args.caption, args.caption_file) {
        (Some(caption), _) => caption,
        (None, Some(path)) => tokio::fs::read_to_string(path).await?,
        (None, None) => return Err("Provide --caption or --caption-file".into()),
    };

    let request = ImportRequest {
        source_url: args.url,
        caption,
        video_url: args.video,
        thumbnail_url: args.thumbnail,
    };
    let outcome = service.extract_and_save(request, caller, cancel).await?;

    if outcome.is_new {
        println!("Created recipe {}", outcome.recipe_id);
    } else {
        println!("Recipe already imported as {}", outcome.recipe_id);
    }
    match &outcome.alignment {
        AlignmentOutcome::Aligned { timed_steps } => {
            println!("Timed {} of {} steps", timed_steps, outcome.recipe.steps.len())
        }
        AlignmentOutcome::Failed(reason) => println!("Saved without timings: {}", reason),
        AlignmentOutcome::Skipped => {}
    }
    print_recipe(&outcome.recipe);
    Ok(())
}

async fn reanalyze(
    service: &RecipeService,
    caller: &Caller,
    args: ReanalyzeArgs,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let policy = match args.prompt {
        Some(text) => PromptPolicy::Custom(CustomPrompt::new(text)?),
        None => args.policy.parse()?,
    };

    println!("Analyzing video ({} prompt)...", policy);
    let handle = service
        .start_reanalysis(args.id, caller, policy, cancel)
        .await?;
    let comparison = service.get_comparison(handle).await?;
    print_comparison(&comparison);

    let decision = if args.apply {
        Decision::Apply
    } else if args.discard {
        Decision::Discard
    } else {
        ask_decision().await?
    };

    let recipe = service.commit(handle, caller, decision).await?;
    match decision {
        Decision::Apply => println!("Applied new timings to {}", recipe.id),
        Decision::Discard => println!("Kept existing timings of {}", recipe.id),
    }
    Ok(())
}

async fn ask_decision() -> Result<Decision, Box<dyn Error>> {
    println!("Apply new timings? [y/N]");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let answer = lines.next_line().await?.unwrap_or_default();

    Ok(match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::Apply,
        _ => Decision::Discard,
    })
}

fn with_step_timing(
    mut steps: Vec<Step>,
    order: u32,
    start: Option<f64>,
    end: Option<f64>,
) -> Result<Vec<Step>, Box<dyn Error>> {
    let step = steps
        .iter_mut()
        .find(|step| step.order == order)
        .ok_or_else(|| format!("Recipe has no step {}", order))?;
    step.video_start_time = start;
    step.video_end_time = end;
    Ok(steps)
}

fn format_time(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) => {
            let whole = s.max(0.0).round() as u64;
            format!("{}:{:02}", whole / 60, whole % 60)
        }
        None => "-".to_string(),
    }
}

fn format_range(step: &Step) -> String {
    if step.has_timing() {
        format!(
            "{}-{}",
            format_time(step.video_start_time),
            format_time(step.video_end_time)
        )
    } else {
        "untimed".to_string()
    }
}

fn print_recipe(recipe: &Recipe) {
    println!("{} ({})", recipe.title, recipe.id);
    println!("Source: {} [{}]", recipe.source_url, recipe.source_platform.as_str());
    if let Some(video) = &recipe.video_url {
        println!("Video: {}", video);
    }
    if let Some(servings) = recipe.servings {
        println!("Servings: {}", servings);
    }

    println!("\nIngredients:");
    for ingredient in &recipe.ingredients {
        let amount = [ingredient.quantity.as_deref(), ingredient.unit.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if amount.is_empty() {
            println!("  - {}", ingredient.name);
        } else {
            println!("  - {} {}", amount, ingredient.name);
        }
    }

    println!("\nSteps:");
    for step in &recipe.steps {
        println!("  {}. [{}] {}", step.order, format_range(step), step.instruction);
    }
}

fn print_comparison(comparison: &Comparison) {
    println!("{:>4}  {:<12}  {:<12}  instruction", "#", "current", "new");
    for row in comparison.rows() {
        let marker = if row.changed { "*" } else { " " };
        let instruction = row
            .current
            .or(row.candidate)
            .map(|step| step.instruction.as_str())
            .unwrap_or_default();
        println!(
            "{}{:>3}  {:<12}  {:<12}  {}",
            marker,
            row.index + 1,
            row.current.map(format_range).unwrap_or_default(),
            row.candidate.map(format_range).unwrap_or_default(),
            instruction
        );
    }
    println!("{} of {} rows changed", comparison.changed_count(), comparison.diff_flags.len());
}
