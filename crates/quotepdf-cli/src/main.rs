//! quotepdf-cli: submit quote PDF jobs and follow them to a download link.

mod args;
mod print;

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use quotepdf_api_types::{CreatePdfJobRequest, PatchPdfJobRequest};
use quotepdf_cli::{CliError, HttpJobsApi, JobsApi, PdfPoller, PollOutcome};

use args::{Cli, Commands, GenerateArgs, JobsCmd};
use print::print_json;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let server = cli.server.as_deref().ok_or(CliError::MissingServer)?;
    let api = HttpJobsApi::new(server, cli.session_env.clone(), cli.request_timeout())?;

    match cli.command {
        Commands::Generate(args) => Ok(generate(api, &args).await),
        Commands::Status { quote_id, job_id } => {
            print_json(&api.status(quote_id, job_id).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Jobs(args) => {
            jobs(&api, args.action).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn generate(api: HttpJobsApi, args: &GenerateArgs) -> ExitCode {
    let poller = PdfPoller::new(Arc::new(api), args.poller_config());
    let cancel = async {
        // A failed signal registration leaves the poller bounded by its own limits.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let outcome = poller.generate(args.quote_id, cancel).await;
    match &outcome {
        PollOutcome::Ready { url, .. } => println!("{url}"),
        other => eprintln!("{}", other.message()),
    }
    ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1))
}

async fn jobs(api: &HttpJobsApi, action: JobsCmd) -> Result<(), CliError> {
    match action {
        JobsCmd::List => print_json(&api.list_jobs().await?),
        JobsCmd::Get { id } => print_json(&api.get_job(id).await?),
        JobsCmd::Create { quote_id, s3_key } => {
            let body = CreatePdfJobRequest {
                quote_id: Some(quote_id),
                s3_key,
            };
            print_json(&api.create_job(&body).await?)
        }
        JobsCmd::Patch {
            id,
            status,
            s3_key,
            clear_s3_key,
        } => {
            let s3_key = if clear_s3_key { Some(None) } else { s3_key.map(Some) };
            if status.is_none() && s3_key.is_none() {
                return Err(CliError::InvalidInput(
                    "nothing to update; pass --status, --s3-key or --clear-s3-key".into(),
                ));
            }
            let body = PatchPdfJobRequest {
                status: status.map(Into::into),
                s3_key,
            };
            print_json(&api.patch_job(id, &body).await?)
        }
    }
}
