use argh::FromArgs;
use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use visual_chat::BackendStatus;

mod messages;

// defaults for the server
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MODEL: &str = "mock";

#[derive(FromArgs)]
/// Stand-in for the remote inference service. Answers every question by
/// describing what it received.
struct MockArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// model name reported by the status route
    #[argh(option, short = 'm', default = "DEFAULT_MODEL.to_string()")]
    model: String,
}

async fn get_status(State(model): State<Arc<String>>) -> impl IntoResponse {
    Json(BackendStatus {
        status: "ok".to_string(),
        model: Some(model.as_ref().clone()),
    })
}

async fn post_ask(mut multipart: Multipart) -> impl IntoResponse {
    let mut image: Option<(String, usize)> = None;
    let mut question: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Malformed multipart body: {e}");
                return error_reply(StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                match field.bytes().await {
                    Ok(bytes) => image = Some((file_name, bytes.len())),
                    Err(e) => return error_reply(StatusCode::BAD_REQUEST, e.to_string()),
                }
            }
            Some("question") => match field.text().await {
                Ok(text) => question = Some(text),
                Err(e) => return error_reply(StatusCode::BAD_REQUEST, e.to_string()),
            },
            other => log::debug!("Ignoring field {other:?}"),
        }
    }

    let (Some((file_name, len)), Some(question)) = (image, question) else {
        return error_reply(
            StatusCode::UNPROCESSABLE_ENTITY,
            "both `image` and `question` are required".to_string(),
        );
    };

    if len == 0 {
        return error_reply(
            StatusCode::BAD_REQUEST,
            "Uploaded file is not a valid image.".to_string(),
        );
    }

    log::info!("Answering {question:?} about {file_name} ({len} bytes)");

    let reply = messages::AnswerReply {
        answer: format!("You asked {question:?} about {file_name} ({len} bytes)."),
    };
    (StatusCode::OK, Json(json!(reply)))
}

fn error_reply(status: StatusCode, error: String) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(json!(messages::ErrorReply { error })))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: MockArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let app = Router::new()
        .route("/", get(get_status))
        .route("/ask", post(post_ask))
        .with_state(Arc::new(args.model));

    log::info!("Starting the mock backend");
    log::info!("Listening on: {}", addr);
    log::info!("Point the client at it with VISUAL_CHAT_BACKEND_URL=http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
