use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use client_core::{
    AlwaysConfirm, ClientError, Intent, ParameterField, PhotoCandidate, SelectedStyle,
    SessionController, Settings, TemplateImage, ViewState,
};
use serde_json::{json, Value};
use shared::protocol::DeleteTemplateRequest;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Field {
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

type Fields = HashMap<String, Field>;

#[derive(Clone, Default)]
struct MockState {
    generate_calls: Arc<Mutex<Vec<Fields>>>,
    upload_calls: Arc<Mutex<Vec<Fields>>>,
    catalogue: Arc<Mutex<BTreeMap<String, Value>>>,
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 200, 90, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

async fn collect_fields(mut multipart: Multipart) -> Fields {
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.expect("field bytes").to_vec();
        fields.insert(
            name,
            Field {
                filename,
                content_type,
                bytes,
            },
        );
    }
    fields
}

fn text(fields: &Fields, name: &str) -> String {
    String::from_utf8(fields[name].bytes.clone()).expect("utf8 field")
}

async fn handle_generate(
    State(state): State<MockState>,
    multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let fields = collect_fields(multipart).await;
    let style = text(&fields, "style");
    state.generate_calls.lock().expect("lock").push(fields);

    match style.as_str() {
        "faceless" => (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "No face detected in the photo"})),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "image": format!("data:image/png;base64,{}", STANDARD.encode(png(40, 30))),
                "message": "Emoji generated successfully",
            })),
        ),
    }
}

async fn handle_list(State(state): State<MockState>) -> Json<Value> {
    let templates = state.catalogue.lock().expect("lock").clone();
    Json(json!({"status": "success", "templates": templates}))
}

async fn handle_upload(
    State(state): State<MockState>,
    multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let fields = collect_fields(multipart).await;
    let name = text(&fields, "style_name");
    let description = text(&fields, "description");
    state.upload_calls.lock().expect("lock").push(fields);
    state.catalogue.lock().expect("lock").insert(
        name.clone(),
        json!({"description": description, "image": format!("/static/custom/{name}.png")}),
    );
    (
        StatusCode::OK,
        Json(json!({"status": "success", "message": "Template saved"})),
    )
}

async fn handle_delete(
    State(state): State<MockState>,
    Json(request): Json<DeleteTemplateRequest>,
) -> (StatusCode, Json<Value>) {
    let removed = state
        .catalogue
        .lock()
        .expect("lock")
        .remove(&request.style_name);
    match removed {
        Some(_) => (
            StatusCode::OK,
            Json(json!({"status": "success", "message": "Template deleted"})),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "Template not found"})),
        ),
    }
}

async fn handle_gateway_error() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "<html>upstream unavailable</html>")
}

async fn spawn_mock_service(state: MockState) -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/generate", post(handle_generate))
        .route("/templates", get(handle_list))
        .route("/templates/upload", post(handle_upload))
        .route("/templates/delete", post(handle_delete))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn spawn_broken_service() -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route("/generate", post(handle_gateway_error));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn connect(service_url: String) -> SessionController {
    let settings = Settings {
        service_url: format!("{service_url}/"),
        request_timeout_secs: 10,
        progress_tick_ms: 20,
        ..Settings::default()
    };
    SessionController::connect(&settings, Arc::new(AlwaysConfirm)).expect("connect")
}

fn photo() -> Intent {
    Intent::StagePhoto(PhotoCandidate::new("selfie.jpg", "image/jpeg", vec![0xAB; 4096]))
}

#[tokio::test]
async fn generation_posts_photo_style_and_every_parameter() {
    let state = MockState::default();
    let url = spawn_mock_service(state.clone()).await.expect("spawn");
    let mut controller = connect(url);

    controller.dispatch(photo()).await.expect("stage");
    controller
        .dispatch(Intent::SetParameter {
            field: ParameterField::BorderCleanupPixels,
            value: 7,
        })
        .await
        .expect("set");
    controller.dispatch(Intent::Generate).await.expect("generate");
    controller
        .settle()
        .await
        .expect("in flight")
        .expect("success");

    let result = controller.current_result().expect("result");
    assert_eq!((result.width, result.height), (40, 30));
    assert_eq!(result.mime_type, "image/png");
    assert_eq!(
        controller.view_state(),
        &ViewState::Result { adjust_open: true }
    );

    let calls = state.generate_calls.lock().expect("lock").clone();
    assert_eq!(calls.len(), 1);
    let fields = &calls[0];
    let photo = &fields["photo"];
    assert_eq!(photo.filename.as_deref(), Some("selfie.jpg"));
    assert_eq!(photo.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(photo.bytes.len(), 4096);
    assert_eq!(text(fields, "style"), "panda");
    assert_eq!(text(fields, "brighten_factor"), "50");
    assert_eq!(text(fields, "darken_factor"), "50");
    assert_eq!(text(fields, "low_cutoff_percent"), "30");
    assert_eq!(text(fields, "high_cutoff_percent"), "20");
    assert_eq!(text(fields, "border_cleanup_pixels"), "7");
}

#[tokio::test]
async fn error_status_body_message_reaches_the_view() {
    let state = MockState::default();
    state.catalogue.lock().expect("lock").insert(
        "faceless".into(),
        json!({"description": null, "image": "/static/custom/faceless.png"}),
    );
    let url = spawn_mock_service(state).await.expect("spawn");
    let mut controller = connect(url);

    controller.dispatch(Intent::LoadTemplates).await.expect("load");
    controller
        .dispatch(Intent::SelectStyle("faceless".into()))
        .await
        .expect("select");
    controller.dispatch(photo()).await.expect("stage");
    controller.dispatch(Intent::Generate).await.expect("generate");
    let err = controller
        .settle()
        .await
        .expect("in flight")
        .expect_err("rejected");

    assert_eq!(
        err,
        ClientError::GenerationRejected("No face detected in the photo".into())
    );
    assert!(matches!(
        controller.view_state(),
        ViewState::Error { message, .. } if message == "No face detected in the photo"
    ));
}

#[tokio::test]
async fn non_json_failure_is_reported_as_network_error() {
    let url = spawn_broken_service().await.expect("spawn");
    let mut controller = connect(url);

    controller.dispatch(photo()).await.expect("stage");
    controller.dispatch(Intent::Generate).await.expect("generate");
    let err = controller
        .settle()
        .await
        .expect("in flight")
        .expect_err("bad gateway");

    assert!(err.is_retryable());
    assert!(err.to_string().contains("502"), "unexpected error: {err}");
}

#[tokio::test]
async fn template_lifecycle_round_trips_through_the_service() {
    let state = MockState::default();
    let url = spawn_mock_service(state.clone()).await.expect("spawn");
    let mut controller = connect(url);

    controller.dispatch(Intent::LoadTemplates).await.expect("load");
    assert!(controller.templates().is_empty());

    controller
        .dispatch(Intent::CreateTemplate {
            name: "  fox ".into(),
            description: Some("orange".into()),
            image: TemplateImage::new("fox.png", "image/png", png(16, 16)),
        })
        .await
        .expect("create");

    let uploads = state.upload_calls.lock().expect("lock").clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(text(&uploads[0], "style_name"), "fox");
    assert_eq!(text(&uploads[0], "description"), "orange");
    assert_eq!(
        uploads[0]["template"].content_type.as_deref(),
        Some("image/png")
    );

    let templates = controller.templates();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name, "fox");
    assert_eq!(templates[0].description.as_deref(), Some("orange"));

    controller
        .dispatch(Intent::SelectStyle("fox".into()))
        .await
        .expect("select");
    controller
        .dispatch(Intent::DeleteTemplate { name: "fox".into() })
        .await
        .expect("delete");

    assert!(controller.templates().is_empty());
    assert_eq!(controller.selected_style(), &SelectedStyle::default());
    assert!(state.catalogue.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn unreachable_template_service_is_retryable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");

    let settings = Settings {
        service_url: format!("http://{addr}"),
        request_timeout_secs: 2,
        ..Settings::default()
    };
    let mut controller =
        SessionController::connect(&settings, Arc::new(AlwaysConfirm)).expect("connect");

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        controller.dispatch(Intent::LoadTemplates),
    )
    .await
    .expect("no hang")
    .expect_err("unreachable");
    assert!(matches!(err, ClientError::RegistryUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn image_only_template_update_keeps_the_description() {
    let state = MockState::default();
    let url = spawn_mock_service(state.clone()).await.expect("spawn");
    let mut controller = connect(url);

    controller.dispatch(Intent::LoadTemplates).await.expect("load");
    controller
        .dispatch(Intent::CreateTemplate {
            name: "fox".into(),
            description: Some("orange".into()),
            image: TemplateImage::new("fox.png", "image/png", png(16, 16)),
        })
        .await
        .expect("create");
    controller
        .dispatch(Intent::UpdateTemplate {
            name: "fox".into(),
            description: None,
            image: Some(TemplateImage::new("fox2.png", "image/png", png(24, 24))),
        })
        .await
        .expect("update");

    let uploads = state.upload_calls.lock().expect("lock").clone();
    assert_eq!(uploads.len(), 2);
    assert_eq!(text(&uploads[1], "description"), "orange");
    assert_eq!(
        uploads[1]["template"].filename.as_deref(),
        Some("fox2.png")
    );

    let templates = controller.templates();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].description.as_deref(), Some("orange"));
}
