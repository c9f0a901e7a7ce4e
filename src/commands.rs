use anyhow::Context as _;

use crate::browser::WebDriverConfig;
use crate::cli::{
    CheckArgs, Cli, Command, DownloadArgs, ExtractArgs, FilesArgs, LsArgs, SelectArgs,
};
use crate::config::ScrapeConfig;
use crate::dataset::RemoteDataset;
use crate::error::Error;
use crate::fetch::Fetcher;
use crate::formats::Dataset;
use crate::report;
use crate::scrape::{ScrapeMode, fetch_datasets};
use crate::storage::Storage;

struct Context {
    config: ScrapeConfig,
    fetcher: Fetcher,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ScrapeConfig::default()
        .with_root_url(cli.url)
        .with_webdriver(WebDriverConfig::from_env());
    let fetcher = Fetcher::new(&config).context("build http client")?;
    let ctx = Context { config, fetcher };

    match cli.command {
        Command::Ls(args) => ls(&ctx, args).await.context("ls"),
        Command::Latest => latest(&ctx).await.context("latest"),
        Command::Check(args) => check(&ctx, args).await.context("check"),
        Command::Url(args) => url(&ctx, args).await.context("url"),
        Command::Files(args) => files(&ctx, args).await.context("files"),
        Command::Download(args) => download(&ctx, args).await.context("download"),
        Command::Extract(args) => extract(&ctx, args).await.context("extract"),
    }
}

async fn ls(ctx: &Context, args: LsArgs) -> anyhow::Result<()> {
    let mode = if args.full {
        ScrapeMode::Full
    } else {
        ScrapeMode::Simple
    };
    let result = fetch_datasets(&ctx.fetcher, &ctx.config, mode).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string(&result.datasets).context("serialize datasets")?
        );
        return Ok(());
    }

    if result.datasets.is_empty() && result.errors.is_empty() {
        eprintln!("No datasets found.");
        return Ok(());
    }
    if !result.datasets.is_empty() {
        print!("{}", report::dataset_table(&result.datasets));
    }
    if !result.errors.is_empty() {
        eprintln!();
        eprint!("{}", report::error_summary(&result.errors));
    }
    Ok(())
}

async fn latest(ctx: &Context) -> anyhow::Result<()> {
    let dataset = select_dataset(ctx, None).await?;
    println!("{}", dataset.dataset_id);
    Ok(())
}

async fn check(ctx: &Context, args: CheckArgs) -> anyhow::Result<()> {
    let dataset = select_dataset(ctx, None).await?;
    if dataset.matches_id(&args.since) {
        return Err(Error::NotFound(format!(
            "no dataset newer than {} (latest is {})",
            args.since, dataset.dataset_id
        ))
        .into());
    }
    println!("{}", dataset.dataset_id);
    Ok(())
}

async fn url(ctx: &Context, args: SelectArgs) -> anyhow::Result<()> {
    let dataset = remote_dataset(ctx, &args).await?;
    println!("{}", dataset.archive_url().await?);
    Ok(())
}

async fn files(ctx: &Context, args: FilesArgs) -> anyhow::Result<()> {
    let dataset = remote_dataset(ctx, &args.select).await?;
    let files = dataset.files().await?;
    if files.is_empty() {
        return Err(Error::NotFound("archive contains no files".to_owned()).into());
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string(&files).context("serialize archive files")?
        );
    } else {
        print!("{}", report::file_table(&files));
    }
    Ok(())
}

async fn download(ctx: &Context, args: DownloadArgs) -> anyhow::Result<()> {
    let dataset = remote_dataset(ctx, &args.select).await?;
    tracing::info!(dataset_id = %dataset.dataset().dataset_id, dest = %args.path, "downloading");
    let path = dataset.download(&args.path).await?;
    println!("{path}");
    Ok(())
}

async fn extract(ctx: &Context, args: ExtractArgs) -> anyhow::Result<()> {
    let dataset = remote_dataset(ctx, &args.select).await?;
    tracing::info!(
        dataset_id = %dataset.dataset().dataset_id,
        pattern = %args.pattern,
        dest = %args.output_dir,
        "extracting"
    );
    let extracted = dataset.extract(&args.pattern, &args.output_dir).await?;
    if extracted.is_empty() {
        return Err(
            Error::NotFound(format!("No files matched pattern: {}", args.pattern)).into(),
        );
    }
    for path in extracted {
        println!("{path}");
    }
    Ok(())
}

async fn remote_dataset(ctx: &Context, args: &SelectArgs) -> anyhow::Result<RemoteDataset> {
    let dataset = select_dataset(ctx, args.id.as_deref()).await?;
    let storage = Storage::from_env().context("configure storage backends")?;
    Ok(RemoteDataset::new(dataset, ctx.fetcher.clone(), storage))
}

/// The latest current dataset, or the one matching `id`. Historical ids are
/// only visible in full mode, so that is tried when the simple page lacks `id`.
async fn select_dataset(ctx: &Context, id: Option<&str>) -> anyhow::Result<Dataset> {
    let result = fetch_datasets(&ctx.fetcher, &ctx.config, ScrapeMode::Simple).await?;

    let Some(id) = id else {
        return result
            .current()
            .cloned()
            .ok_or_else(|| Error::NotFound("No current dataset found.".to_owned()).into());
    };

    if let Some(dataset) = result.find(id) {
        return Ok(dataset.clone());
    }

    tracing::info!(id, "dataset not on the landing page; running full scrape");
    let result = fetch_datasets(&ctx.fetcher, &ctx.config, ScrapeMode::Full).await?;
    result
        .find(id)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("Dataset not found: {id}")).into())
}

/// Exit status for a failed command: 1 for "not found" conditions, 2 otherwise.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let not_found = err.chain().any(|cause| {
        cause
            .downcast_ref::<Error>()
            .is_some_and(Error::is_not_found)
    });
    if not_found { 1 } else { 2 }
}
