use std::sync::Arc;
use std::time::Duration;

use cooklang_reel::model::TaskId;
use cooklang_reel::video::{IndexingState, TemporalAnalyzer, VideoIndexer};
use cooklang_reel::{
    AlignmentError, AnalysisError, IndexingError, PromptPolicy, TwelveLabsClient, VideoBackend,
    VideoHandle,
};
use mockito::Matcher;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn client(server: &mockito::Server) -> TwelveLabsClient {
    TwelveLabsClient::new("tl-key", server.url(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_create_task_posts_index_and_url() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/tasks")
        .match_header("x-api-key", "tl-key")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("idx-1".to_string()),
            Matcher::Regex("https://cdn.example.com/pasta.mp4".to_string()),
        ]))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"_id": "task-1"}"#)
        .create_async()
        .await;

    let task = client(&server)
        .create_task("idx-1", "https://cdn.example.com/pasta.mp4")
        .await
        .unwrap();

    assert_eq!(task, TaskId("task-1".to_string()));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_task_status_maps_backend_states() {
    let mut server = mockito::Server::new_async().await;
    let _indexing = server
        .mock("GET", "/tasks/task-1")
        .match_header("x-api-key", "tl-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"_id": "task-1", "status": "indexing"}"#)
        .create_async()
        .await;
    let _ready = server
        .mock("GET", "/tasks/task-2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"_id": "task-2", "status": "ready", "video_id": "vid-1"}"#)
        .create_async()
        .await;

    let client = client(&server);

    let status = client.task_status(&TaskId("task-1".to_string())).await.unwrap();
    assert_eq!(status.state, IndexingState::Processing);
    assert_eq!(status.raw_status, "indexing");
    assert_eq!(status.video_id, None);

    let status = client.task_status(&TaskId("task-2".to_string())).await.unwrap();
    assert_eq!(status.state, IndexingState::Ready);
    assert_eq!(status.video_id.as_deref(), Some("vid-1"));
}

#[tokio::test]
async fn test_analyze_sends_prompt_without_streaming() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/analyze")
        .match_header("x-api-key", "tl-key")
        .match_body(Matcher::PartialJson(json!({
            "video_id": "vid-1",
            "prompt": "Where is each step?",
            "stream": false
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "gen-1", "data": "[{\"step\": 1, \"startSeconds\": 0, \"endSeconds\": 12}]"}"#)
        .create_async()
        .await;

    let response = client(&server)
        .analyze(&VideoHandle("vid-1".to_string()), "Where is each step?", 0.1)
        .await
        .unwrap();

    assert!(response.data.unwrap().contains("startSeconds"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/tasks/missing")
        .with_status(404)
        .with_body(r#"{"code": "resource_not_exists"}"#)
        .create_async()
        .await;

    let err = client(&server)
        .task_status(&TaskId("missing".to_string()))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("404"), "{}", message);
    assert!(message.contains("resource_not_exists"), "{}", message);
}

#[tokio::test]
async fn test_index_and_analyze_against_http_backend() {
    let _ = env_logger::try_init();
    let mut server = mockito::Server::new_async().await;
    let _create = server
        .mock("POST", "/tasks")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"_id": "task-9"}"#)
        .create_async()
        .await;
    let _status = server
        .mock("GET", "/tasks/task-9")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"_id": "task-9", "status": "ready", "video_id": "vid-9"}"#)
        .create_async()
        .await;
    let _analyze = server
        .mock("POST", "/analyze")
        .match_body(Matcher::PartialJson(json!({ "video_id": "vid-9" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": "```json\n[{\"step\": 1, \"startSeconds\": 0, \"endSeconds\": 20}, {\"step\": 2, \"startSeconds\": 20, \"endSeconds\": null}]\n```"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let backend: Arc<dyn VideoBackend> = Arc::new(client(&server));
    let indexer = VideoIndexer::new(
        backend.clone(),
        "idx-1",
        Duration::from_millis(10),
        Duration::from_secs(5),
    );
    let analyzer = TemporalAnalyzer::new(backend, 0.1, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let video = indexer
        .index_and_wait("https://cdn.example.com/pasta.mp4", &cancel)
        .await
        .unwrap();
    assert_eq!(video, VideoHandle("vid-9".to_string()));

    let instructions = vec!["Boil water.".to_string(), "Add pasta.".to_string()];
    let spans = analyzer
        .analyze(&video, &instructions, &PromptPolicy::Strict, &cancel)
        .await
        .unwrap();

    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].start_seconds, Some(0.0));
    assert_eq!(spans[0].end_seconds, Some(20.0));
    assert_eq!(spans[1].start_seconds, Some(20.0));
    assert_eq!(spans[1].end_seconds, None);
}

#[tokio::test]
async fn test_failed_indexing_and_empty_analysis() {
    let mut server = mockito::Server::new_async().await;
    let _create = server
        .mock("POST", "/tasks")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"_id": "task-3"}"#)
        .create_async()
        .await;
    let _status = server
        .mock("GET", "/tasks/task-3")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"_id": "task-3", "status": "failed"}"#)
        .create_async()
        .await;
    let _analyze = server
        .mock("POST", "/analyze")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": "   "}"#)
        .create_async()
        .await;

    let backend: Arc<dyn VideoBackend> = Arc::new(client(&server));
    let indexer = VideoIndexer::new(
        backend.clone(),
        "idx-1",
        Duration::from_millis(10),
        Duration::from_secs(5),
    );
    let cancel = CancellationToken::new();

    match indexer.index_and_wait("https://cdn.example.com/x.mp4", &cancel).await {
        Err(IndexingError::Terminal { status }) => assert_eq!(status, "failed"),
        other => panic!("expected terminal failure, got {:?}", other),
    }

    let analyzer = TemporalAnalyzer::new(backend, 0.1, Duration::from_secs(5));
    let result = analyzer
        .analyze(
            &VideoHandle("vid-1".to_string()),
            &["Boil water.".to_string()],
            &PromptPolicy::Tolerant,
            &cancel,
        )
        .await;
    assert!(matches!(
        result,
        Err(AlignmentError::Analysis(AnalysisError::EmptyResponse))
    ));
}
