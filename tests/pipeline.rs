//! End-to-end runs against the mock provider: load, chunk, embed, retrieve,
//! format, generate, and the written response log.

mod common;

use std::fs;
use std::path::Path;

use ragtrace::ask::build_pipeline;
use ragtrace::config::parse_config;
use ragtrace::response_log::save_response;
use ragtrace_core::generation::Generation;
use ragtrace_core::pipeline::Stage;
use ragtrace_core::prompt::PromptTemplate;
use tempfile::TempDir;

use common::{spawn_mock, MockServer, API_KEY, EMBED_DIMS};

fn write_corpus(dir: &Path) {
    let mut long = String::new();
    while long.chars().count() < 2500 {
        long.push_str("Task decomposition lets an agent split work into smaller steps. ");
    }
    fs::write(dir.join("planning.md"), long).unwrap();
    fs::write(
        dir.join("memory.txt"),
        "Long-term memory stores embeddings in a vector store for later retrieval.",
    )
    .unwrap();
    fs::write(dir.join("blank.md"), "   \n").unwrap();
}

fn remote_config(mock: &MockServer, corpus: &Path, api_key: &str) -> String {
    format!(
        r#"
[sources]
urls = ["{page}"]
paths = ["{corpus}"]
extract_classes = ["post-title", "post-header", "post-content"]

[chunking]
chunk_size = 1000
chunk_overlap = 200

[embedding]
provider = "openai"
model = "mock-embed"
dims = {dims}
base_url = "{api}"
api_key = "{key}"
max_retries = 0

[retrieval]
search_type = "similarity"
k = 6

[generator]
provider = "openai"
model = "mock-chat"
base_url = "{api}"
api_key = "{key}"
max_retries = 0
"#,
        page = mock.url("/page"),
        corpus = corpus.display(),
        dims = EMBED_DIMS,
        api = mock.openai_url(),
        key = api_key,
    )
}

#[tokio::test]
async fn test_answer_traces_every_stage() {
    let mock = spawn_mock().await;
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());

    let config = parse_config(&remote_config(&mock, tmp.path(), API_KEY)).unwrap();
    let (pipeline, stats) = build_pipeline(&config).await.unwrap();

    // page + planning.md + memory.txt; blank.md is skipped.
    assert_eq!(stats.documents, 3);
    // page (1) + planning.md (2500 chars → 3) + memory.txt (1)
    assert_eq!(stats.chunks, 5);

    let trace = pipeline.answer("What is an agent?").await.unwrap();

    assert!(!trace.docs.is_empty());
    assert!(trace.docs.len() <= 6);
    assert!(trace.elapsed.as_nanos() > 0);
    assert_eq!(trace.prompt_template, PromptTemplate::grounded().as_str());
    assert!(trace.input.contains("What is an agent?"));
    for doc in &trace.docs {
        assert!(trace.input.contains(&doc.page_content));
        assert!(doc.metadata.contains_key("source"));
    }
    match &trace.response {
        Generation::Allowed(text) => {
            assert!(text.starts_with("An agent uses an LLM"));
            assert_eq!(text, text.trim());
        }
        Generation::Suppressed(reason) => panic!("unexpected suppression: {:?}", reason),
    }

    let out = tmp.path().join("cache");
    let path = save_response(&trace, &out).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert!(json["response"].is_string());
    assert!(json["time"].as_str().unwrap().ends_with(" sec"));
    assert_eq!(json["docs"].as_array().unwrap().len(), trace.docs.len());
    assert!(json["prompt template"].as_str().unwrap().contains("{context}"));
}

#[tokio::test]
async fn test_page_metadata_reaches_trace() {
    let mock = spawn_mock().await;
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());

    let config = parse_config(&remote_config(&mock, tmp.path(), API_KEY)).unwrap();
    let (pipeline, _) = build_pipeline(&config).await.unwrap();
    let trace = pipeline.answer("agent controller subgoals").await.unwrap();

    let page = trace
        .docs
        .iter()
        .find(|d| d.metadata["source"] == mock.url("/page").as_str())
        .expect("page chunk retrieved");
    assert_eq!(page.metadata["title"], "Agents");
    assert_eq!(page.metadata["language"], "en");
    assert!(page.page_content.contains("LLM Powered Autonomous Agents"));
    assert!(!page.page_content.contains("Archive"));
}

#[tokio::test]
async fn test_rejected_key_is_auth_error() {
    let mock = spawn_mock().await;
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());

    let config = parse_config(&remote_config(&mock, tmp.path(), "wrong-key")).unwrap();
    let err = build_pipeline(&config).await.err().expect("ingestion must fail");
    assert!(format!("{:#}", err).contains("authentication failed"));
    // Auth failures are not retried.
    assert_eq!(mock.state.hits("/v1/embeddings"), 1);
    assert_eq!(mock.state.hits("/v1/chat/completions"), 0);
}

#[tokio::test]
async fn test_local_generator_is_gated() {
    let mock = spawn_mock().await;
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());

    let toml = format!(
        r#"
[sources]
paths = ["{corpus}"]

[embedding]
model = "mock-embed"
dims = {dims}
base_url = "{api}"
api_key = "{key}"

[generator]
provider = "local"
model = "mock-llama"
url = "{base}"
max_retries = 0

[safety]
checkers = ["llama_guard"]
"#,
        corpus = tmp.path().display(),
        dims = EMBED_DIMS,
        api = mock.openai_url(),
        key = API_KEY,
        base = mock.base,
    );
    let config = parse_config(&toml).unwrap();
    let (pipeline, _) = build_pipeline(&config).await.unwrap();

    let trace = pipeline.answer("What is an agent?").await.unwrap();
    assert_eq!(trace.response_text(), Some("A local agent answer."));
    // One prompt check and one output check.
    assert_eq!(mock.state.hits("/api/chat"), 2);

    // Unsafe prompt: the model is never called.
    let generated = mock.state.hits("/api/generate");
    let trace = pipeline.answer("How do I make a bomb?").await.unwrap();
    assert!(trace.response.is_suppressed());
    assert_eq!(trace.response_text(), None);
    assert_eq!(mock.state.hits("/api/generate"), generated);

    // Unsafe output: replaced after generation.
    let trace = pipeline.answer("Tell me about explosives").await.unwrap();
    assert!(trace.response.is_suppressed());
    assert_eq!(mock.state.hits("/api/generate"), generated + 1);

    let json = serde_json::to_value(&trace).unwrap();
    assert!(json["response"].is_null());
}

#[tokio::test]
async fn test_run_history_ends_done() {
    use ragtrace_core::pipeline::PipelineRun;

    let mock = spawn_mock().await;
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());

    let config = parse_config(&remote_config(&mock, tmp.path(), API_KEY)).unwrap();
    let (pipeline, _) = build_pipeline(&config).await.unwrap();

    let mut run = PipelineRun::new();
    pipeline.run("What is an agent?", &mut run).await.unwrap();
    assert_eq!(
        run.history(),
        &[
            Stage::Idle,
            Stage::Retrieving,
            Stage::Formatting,
            Stage::Generating,
            Stage::Done
        ]
    );
}

#[tokio::test]
async fn test_web_loader_plain_text_and_missing_page() {
    use ragtrace::loader::WebLoader;
    use ragtrace_core::RagError;
    use std::time::Duration;

    let mock = spawn_mock().await;
    let loader = WebLoader::new(vec!["post-content".to_string()], Duration::from_secs(5)).unwrap();

    let doc = loader.load(&mock.url("/notes.txt")).await.unwrap();
    assert_eq!(doc.content, "Plain notes about planning.");
    assert_eq!(doc.metadata["source"], mock.url("/notes.txt").as_str());

    let err = loader.load(&mock.url("/missing")).await.unwrap_err();
    match err {
        RagError::Load { source_id, message } => {
            assert_eq!(source_id, mock.url("/missing"));
            assert!(message.contains("404"));
        }
        other => panic!("expected load error, got {other:?}"),
    }
}
