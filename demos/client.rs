use argh::FromArgs;
use std::{path::PathBuf, process::ExitCode, time::Duration};
use visual_chat::{BackendConfig, FormError, HttpBackend, QueryForm};

// how long `ask` waits for the backend before giving up on the terminal
const DEFAULT_WAIT_SECS: u64 = 300;

#[derive(FromArgs)]
/// Ask a remote vision model a question about an image
struct ClientArgs {
    /// backend base URL (defaults to $VISUAL_CHAT_BACKEND_URL)
    #[argh(option, short = 'b')]
    backend: Option<String>,

    /// command to execute: "ask" or "status"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Ask(AskCommand),
    Status(StatusCommand),
}

#[derive(FromArgs)]
/// Send an image and a question
#[argh(subcommand, name = "ask")]
struct AskCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: Option<PathBuf>,

    /// the question to ask
    #[argh(option, short = 'q', default = "String::new()")]
    question: String,

    /// seconds to wait for the answer
    #[argh(option, default = "DEFAULT_WAIT_SECS")]
    wait: u64,
}

#[derive(FromArgs)]
/// Check that the backend is up
#[argh(subcommand, name = "status")]
struct StatusCommand {}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ClientArgs = argh::from_env();

    let config = match args.backend {
        Some(url) => BackendConfig::new(url),
        None => BackendConfig::from_env(),
    };

    match args.command {
        ClientCommands::Ask(ask) => {
            let mut form = QueryForm::connect(config)?;
            if let Some(path) = ask.image_path {
                form.select_image_path(path)?;
            }
            form.set_question(ask.question);

            match form.submit() {
                Ok(_) => {}
                Err(e @ FormError::MissingInput) => {
                    eprintln!("{e}");
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }

            eprintln!("{}", form.ask_label());
            if !form.wait(Duration::from_secs(ask.wait)) {
                eprintln!("No answer after {}s", ask.wait);
                return Ok(ExitCode::FAILURE);
            }
            println!("{}", form.answer());
        }
        ClientCommands::Status(_) => {
            let backend = HttpBackend::new(config)?;
            let status = backend.status()?;
            println!("Status: {}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}
