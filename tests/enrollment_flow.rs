use faceauth::{
    api::ApiClient,
    camera::{file::FileCamera, CaptureTrigger},
    cli::globals::Config,
    flow::{FlowOutcome, FlowRunner, PasswordPrompt, Step},
    liveness::{client::LivenessClient, LivenessSession, LivenessWidget, WidgetError},
    shell::{AppShell, AuthMode},
};
use secrecy::SecretString;
use serde_json::json;
use std::{net::TcpListener, path::Path};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Widget that reports completion straight away.
struct CompletedWidget;

impl LivenessWidget for CompletedWidget {
    async fn run(
        &self,
        _session: &LivenessSession,
        _cancel: &CancellationToken,
    ) -> Result<(), WidgetError> {
        Ok(())
    }
}

/// Enrollment never asks for a password.
struct NoPassword;

impl PasswordPrompt for NoPassword {
    async fn password(&self, _cancel: &CancellationToken) -> Option<SecretString> {
        None
    }
}

fn write_png(path: &Path, shade: u8) {
    image::RgbImage::from_pixel(32, 24, image::Rgb([shade, shade, shade]))
        .save(path)
        .unwrap();
}

async fn mount_liveness(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/liveness/session/create"))
        .and(body_partial_json(json!({"employee_id": "ENROLLMENT"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "sess-1",
            "expires_at": "2026-10-19T10:00:00Z"
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/liveness/session/sess-1/result"))
        .and(header("x-api-key", "key-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_live": true})))
        .expect(1)
        .mount(server)
        .await;
}

fn runner(
    server: &MockServer,
    dir: &Path,
) -> FlowRunner<FileCamera, LivenessClient, CompletedWidget, NoPassword, ApiClient> {
    let face = dir.join("face.png");
    let id_card = dir.join("card.png");
    write_png(&face, 200);
    write_png(&id_card, 40);

    let mut config = Config::new(server.uri());
    config.api_key = Some(SecretString::from("key-1"));

    FlowRunner::new(
        FileCamera::new(Some(face), Some(id_card)),
        LivenessClient::new(&config).unwrap(),
        CompletedWidget,
        NoPassword,
        ApiClient::new(&config).unwrap(),
    )
    .with_trigger(Box::new(|_| {
        let (fire, trigger) = CaptureTrigger::manual();
        let _ = fire.send(());
        trigger
    }))
}

#[tokio::test]
async fn enrollment_succeeds_end_to_end() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_liveness(&server).await;

    Mock::given(method("POST"))
        .and(path("/auth/enroll"))
        .and(header("x-api-key", "key-1"))
        .and(body_partial_json(json!({"livenessSessionId": "sess-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": "tok-1",
            "sessionId": "auth-1",
            "employeeInfo": {"employeeId": "E100", "name": "山田 太郎", "department": "開発"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let runner = runner(&server, dir.path());

    let mut shell = AppShell::default();
    shell.select_mode(AuthMode::Enroll);
    let mut flow = shell.controller();
    assert_eq!(flow.step(), Step::IdCardCapture);

    let outcome = runner
        .run(&mut flow, &mut shell, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, FlowOutcome::Completed);
    assert_eq!(flow.step(), Step::Complete);
    assert!(!flow.has_artifacts());
    assert!(shell.is_authenticated());

    let response = shell.authenticated().unwrap();
    assert_eq!(response.token.as_deref(), Some("tok-1"));
    assert_eq!(
        response.employee_info.as_ref().map(|info| info.employee_id.as_str()),
        Some("E100")
    );

    let requests = server.received_requests().await.unwrap();
    let enroll = requests
        .iter()
        .find(|request| request.url.path() == "/auth/enroll")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&enroll.body).unwrap();
    // base64 of a JPEG start-of-image marker
    assert!(body["faceImage"].as_str().unwrap().starts_with("/9j/"));
    assert!(body["idCardImage"].as_str().unwrap().starts_with("/9j/"));
    assert_ne!(body["faceImage"], body["idCardImage"]);
}

#[tokio::test]
async fn enrollment_failure_resets_to_id_card() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_liveness(&server).await;

    Mock::given(method("POST"))
        .and(path("/auth/enroll"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "success": false,
            "error": {
                "code": "DUPLICATE_ENROLLMENT",
                "message": "この社員は既に登録されています",
                "systemReason": "face already indexed",
                "details": "E100"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let runner = runner(&server, dir.path());

    let mut shell = AppShell::default();
    shell.select_mode(AuthMode::Enroll);
    let mut flow = shell.controller();

    let outcome = runner
        .run(&mut flow, &mut shell, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        FlowOutcome::Failed {
            step: Step::Submitting,
            message: "この社員は既に登録されています".to_string(),
        }
    );
    assert_eq!(flow.step(), Step::IdCardCapture);
    assert!(!flow.has_artifacts());
    assert!(!flow.in_flight());
    assert_eq!(
        flow.error(),
        Some("この社員は既に登録されています\n詳細: \"E100\"")
    );
    assert!(!flow.emergency_offer_visible());

    assert!(!shell.is_authenticated());
    assert_eq!(shell.last_error(), Some("この社員は既に登録されています"));
}
