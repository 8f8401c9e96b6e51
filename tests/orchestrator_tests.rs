mod common;

use std::sync::{Arc, Mutex};

use common::{
    FakeChat, FakeGenerate, FakeTransports, MemoryStore, RecordingView, gemini_prefs,
    openai_prefs, orchestrator,
};
use openai_api_rs::v1::chat_completion::Content;
use tldr_mail::ai::ProviderSelector;
use tldr_mail::core::config::{
    MapPreferences, OPENAI_DEFAULT_SUMMARY_PROMPT, Preferences, ProviderKind,
};
use tldr_mail::core::models::MessageId;
use tldr_mail::document::images::InlineImage;
use tldr_mail::worker::{OutcomeKind, SummarizeOrchestrator, TaskOwner};

fn text_of(content: &Content) -> Vec<String> {
    match content {
        Content::Text(text) => vec![text.clone()],
        Content::ImageUrl(parts) => parts.iter().filter_map(|p| p.text.clone()).collect(),
    }
}

fn image_urls_of(content: &Content) -> Vec<String> {
    match content {
        Content::Text(_) => Vec::new(),
        Content::ImageUrl(parts) => parts
            .iter()
            .filter_map(|p| p.image_url.as_ref().map(|u| u.url.clone()))
            .collect(),
    }
}

#[tokio::test]
async fn test_message_without_content_is_empty() {
    let transports = FakeTransports::new(FakeChat::replying(&["unused"]), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(1, Some("Hi"), None);
    let orchestrator = orchestrator(store, openai_prefs(), transports.clone());

    assert!(orchestrator.summarize(MessageId(1)).await.unwrap().is_none());
    assert!(orchestrator.summarize(MessageId(99)).await.unwrap().is_none());
    assert_eq!(transports.chat.call_count(), 0);
    assert_eq!(transports.built(), 0);
}

#[tokio::test]
async fn test_openai_sends_prompt_subject_and_body() {
    let transports = FakeTransports::new(
        FakeChat::replying(&["Short summary"]),
        FakeGenerate::empty(),
    );
    let store = MemoryStore::new().with_message(2, Some("Hi"), Some("<p>Hello world</p>"));
    let orchestrator = orchestrator(store, openai_prefs(), transports.clone());

    let summary = orchestrator.summarize(MessageId(2)).await.unwrap().unwrap();
    assert_eq!(summary.provider, ProviderKind::OpenAi);
    assert_eq!(summary.result.fragments, vec!["Short summary".to_string()]);

    let calls = transports.chat.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let messages = &calls[0];
    assert_eq!(messages.len(), 3);
    assert_eq!(text_of(&messages[0].content), vec!["Summarize".to_string()]);
    assert_eq!(text_of(&messages[1].content), vec!["Hi".to_string()]);
    assert_eq!(text_of(&messages[2].content), vec!["Hello world".to_string()]);
    assert!(matches!(messages[2].content, Content::ImageUrl(_)));
}

#[tokio::test]
async fn test_openai_omits_blank_subject() {
    let transports = FakeTransports::new(FakeChat::replying(&["ok"]), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(3, Some("   "), Some("Hello world"));
    let orchestrator = orchestrator(store, openai_prefs(), transports.clone());

    orchestrator.summarize(MessageId(3)).await.unwrap().unwrap();
    let calls = transports.chat.calls.lock().unwrap();
    assert_eq!(calls[0].len(), 2);
}

#[tokio::test]
async fn test_openai_resolves_inline_images() {
    let transports = FakeTransports::new(FakeChat::replying(&["ok"]), FakeGenerate::empty());
    let store = MemoryStore::new()
        .with_message(
            4,
            None,
            Some(r#"<p>See chart</p><img src="cid:chart@x"><img src="cid:missing@x">"#),
        )
        .with_image(4, "chart@x", InlineImage::new("image/png", vec![1, 2, 3]));
    let orchestrator = orchestrator(store, openai_prefs(), transports.clone());

    orchestrator.summarize(MessageId(4)).await.unwrap().unwrap();
    let calls = transports.chat.calls.lock().unwrap();
    let body = &calls[0].last().unwrap().content;
    assert_eq!(image_urls_of(body), vec!["data:image/png;base64,AQID".to_string()]);
}

#[tokio::test]
async fn test_quotes_are_not_sent() {
    let transports = FakeTransports::new(FakeChat::replying(&["ok"]), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(
        5,
        None,
        Some("<p>New text</p><blockquote>Old thread</blockquote>"),
    );
    let orchestrator = orchestrator(store, openai_prefs(), transports.clone());

    orchestrator.summarize(MessageId(5)).await.unwrap().unwrap();
    let calls = transports.chat.calls.lock().unwrap();
    let sent = text_of(&calls[0].last().unwrap().content).join(" ");
    assert!(sent.contains("New text"));
    assert!(!sent.contains("Old thread"));
}

#[tokio::test]
async fn test_gemini_sends_single_message_and_joins_parts() {
    let transports = FakeTransports::new(
        FakeChat::replying(&["unused"]),
        FakeGenerate::replying(&["Line1", "Line2"]),
    );
    let store = MemoryStore::new().with_message(6, Some("Hi"), Some("<p>Hello world</p>"));
    let orchestrator = orchestrator(store, gemini_prefs(), transports.clone());

    let summary = orchestrator.summarize(MessageId(6)).await.unwrap().unwrap();
    assert_eq!(summary.provider, ProviderKind::Gemini);
    assert_eq!(summary.result.text(), "Line1\nLine2");
    assert_eq!(transports.chat.call_count(), 0);

    let calls = transports.generate.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert_eq!(
        calls[0][0].parts,
        vec!["Summarize".to_string(), "Hello world".to_string()]
    );
}

#[tokio::test]
async fn test_gemini_without_candidates_is_an_empty_success() {
    let transports = FakeTransports::new(FakeChat::replying(&[]), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(7, None, Some("Hello world"));
    let orchestrator = orchestrator(store, gemini_prefs(), transports);

    let summary = orchestrator.summarize(MessageId(7)).await.unwrap().unwrap();
    assert!(summary.result.is_empty());
    assert_eq!(summary.result.text(), "");
}

#[tokio::test]
async fn test_blank_body_skips_provider() {
    let transports = FakeTransports::new(FakeChat::replying(&["x"]), FakeGenerate::replying(&["x"]));
    let store = MemoryStore::new().with_message(8, None, Some("<script>var a = 1;</script>"));
    let orchestrator = orchestrator(store, gemini_prefs(), transports.clone());

    assert!(orchestrator.summarize(MessageId(8)).await.unwrap().is_none());
    assert_eq!(transports.generate.call_count(), 0);
}

#[tokio::test]
async fn test_transport_error_is_a_failure() {
    let transports = FakeTransports::new(
        FakeChat::failing("connection reset, key=sk-abcdefghijklmnop"),
        FakeGenerate::empty(),
    );
    let store = MemoryStore::new().with_message(9, None, Some("Hello world"));
    let orchestrator = orchestrator(store, openai_prefs(), transports);

    let err = orchestrator.summarize(MessageId(9)).await.unwrap_err();
    let message = err.safe_message();
    assert!(!message.is_empty());
    assert!(message.contains("connection reset"));
    assert!(!message.contains("abcdefghijklmnop"));
}

#[tokio::test]
async fn test_no_provider_available_is_empty() {
    let transports = FakeTransports::new(FakeChat::replying(&["x"]), FakeGenerate::replying(&["x"]));
    let store = MemoryStore::new().with_message(10, Some("Hi"), Some("Hello world"));
    let prefs = openai_prefs().with("openai_enabled", "false");
    let orchestrator = orchestrator(store, prefs, transports.clone());

    assert!(orchestrator.summarize(MessageId(10)).await.unwrap().is_none());
    assert_eq!(transports.built(), 0);
    assert_eq!(transports.chat.call_count(), 0);
    assert_eq!(transports.generate.call_count(), 0);
}

#[tokio::test]
async fn test_openai_wins_when_both_available() {
    let transports = FakeTransports::new(FakeChat::replying(&["a"]), FakeGenerate::replying(&["b"]));
    let store = MemoryStore::new().with_message(11, None, Some("Hello world"));
    let prefs = openai_prefs().with("gemini_apikey", "AIza-other");
    let orchestrator = orchestrator(store, prefs, transports.clone());

    let summary = orchestrator.summarize(MessageId(11)).await.unwrap().unwrap();
    assert_eq!(summary.provider, ProviderKind::OpenAi);
    assert_eq!(transports.generate.call_count(), 0);
}

#[tokio::test]
async fn test_repeated_invocations_have_same_outcome_kind() {
    let transports = FakeTransports::new(FakeChat::replying(&["same"]), FakeGenerate::empty());
    let store = MemoryStore::new()
        .with_message(12, None, Some("Hello world"))
        .with_message(13, None, None);
    let orchestrator = orchestrator(store, openai_prefs(), transports.clone());

    let first = orchestrator.summarize(MessageId(12)).await.unwrap();
    let second = orchestrator.summarize(MessageId(12)).await.unwrap();
    assert_eq!(
        first.map(|s| s.result.fragments),
        second.map(|s| s.result.fragments)
    );
    assert_eq!(transports.chat.call_count(), 2);

    assert!(orchestrator.summarize(MessageId(13)).await.unwrap().is_none());
    assert!(orchestrator.summarize(MessageId(13)).await.unwrap().is_none());
}

/// Preferences that can change between invocations.
struct SharedPrefs(Mutex<MapPreferences>);

impl Preferences for SharedPrefs {
    fn get_string(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get_string(key)
    }
}

#[tokio::test]
async fn test_configuration_is_read_per_invocation() {
    let transports = FakeTransports::new(FakeChat::replying(&["a"]), FakeGenerate::replying(&["b"]));
    let prefs = Arc::new(SharedPrefs(Mutex::new(openai_prefs())));
    let orchestrator = SummarizeOrchestrator::new(
        Arc::new(MemoryStore::new().with_message(14, None, Some("Hello world"))),
        prefs.clone(),
        ProviderSelector::new(transports.clone()),
    );

    let first = orchestrator.summarize(MessageId(14)).await.unwrap().unwrap();
    assert_eq!(first.provider, ProviderKind::OpenAi);

    *prefs.0.lock().unwrap() = gemini_prefs();
    let second = orchestrator.summarize(MessageId(14)).await.unwrap().unwrap();
    assert_eq!(second.provider, ProviderKind::Gemini);
}

#[tokio::test]
async fn test_invoke_reports_summary_to_view() {
    let transports = FakeTransports::new(FakeChat::replying(&["Short summary"]), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(20, Some("Hi"), Some("Hello world"));
    let orchestrator = orchestrator(store, openai_prefs(), transports);
    let view = RecordingView::new();
    let mut owner = TaskOwner::new();

    let handle = orchestrator.invoke(&owner, view.clone(), MessageId(20), "Alice", "Hi");
    assert_eq!(
        view.events(),
        vec!["header:Summarize|Alice|Hi", "clear", "progress:true"]
    );

    owner.run_until_idle().await;
    assert_eq!(handle.wait().await, OutcomeKind::Success);
    assert_eq!(
        view.events(),
        vec![
            "header:Summarize|Alice|Hi",
            "clear",
            "progress:true",
            "summary:Short summary",
            "progress:false"
        ]
    );
}

#[tokio::test]
async fn test_invoke_shows_nothing_when_empty() {
    let transports = FakeTransports::new(FakeChat::replying(&["x"]), FakeGenerate::empty());
    let orchestrator = orchestrator(MemoryStore::new(), MapPreferences::new(), transports);
    let view = RecordingView::new();
    let mut owner = TaskOwner::new();

    let handle = orchestrator.invoke(&owner, view.clone(), MessageId(21), "", "");
    owner.run_until_idle().await;

    assert_eq!(handle.wait().await, OutcomeKind::Success);
    assert_eq!(
        view.events(),
        vec!["header:Summarize||", "clear", "progress:true", "progress:false"]
    );
}

#[tokio::test]
async fn test_invoke_shows_safe_error_on_failure() {
    let transports = FakeTransports::new(FakeChat::failing("quota exceeded"), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(22, None, Some("Hello world"));
    let orchestrator = orchestrator(store, openai_prefs(), transports);
    let view = RecordingView::new();
    let mut owner = TaskOwner::new();

    let handle = orchestrator.invoke(&owner, view.clone(), MessageId(22), "Bob", "Re: plan");
    owner.run_until_idle().await;

    assert_eq!(handle.wait().await, OutcomeKind::Failure);
    let events = view.events();
    assert_eq!(events.len(), 5);
    assert_eq!(events[3], "error:Failed to access OpenAI API: quota exceeded");
    assert_eq!(events[4], "progress:false");
    assert!(!events.iter().any(|e| e.starts_with("summary:")));
}

#[tokio::test]
async fn test_invoke_after_teardown_touches_only_header() {
    let transports = FakeTransports::new(FakeChat::replying(&["x"]), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(23, None, Some("Hello world"));
    let orchestrator = orchestrator(store, openai_prefs(), transports.clone());
    let view = RecordingView::new();
    let mut owner = TaskOwner::new();

    let handle = orchestrator.invoke(&owner, view.clone(), MessageId(23), "", "");
    owner.tear_down();

    assert_eq!(handle.wait().await, OutcomeKind::Cancelled);
    assert_eq!(
        view.events(),
        vec!["header:Summarize||", "clear", "progress:true"]
    );
}

#[tokio::test]
async fn test_invoke_header_uses_cleaned_prompt() {
    let transports = FakeTransports::new(FakeChat::replying(&["ok"]), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(30, None, Some("Hello world"));
    let prefs = openai_prefs().with("openai_summarize", "\u{1b}  \u{7}");
    let orchestrator = orchestrator(store, prefs, transports.clone());
    let view = RecordingView::new();
    let mut owner = TaskOwner::new();

    let handle = orchestrator.invoke(&owner, view.clone(), MessageId(30), "Alice", "Hi");
    owner.run_until_idle().await;
    assert_eq!(handle.wait().await, OutcomeKind::Success);

    let header = format!("header:{OPENAI_DEFAULT_SUMMARY_PROMPT}|Alice|Hi");
    assert_eq!(view.events()[0], header);

    let calls = transports.chat.calls.lock().unwrap();
    assert_eq!(
        text_of(&calls[0][0].content),
        vec![OPENAI_DEFAULT_SUMMARY_PROMPT.to_string()]
    );
}

#[tokio::test]
async fn test_quoted_signature_keeps_reply() {
    let transports = FakeTransports::new(FakeChat::replying(&["ok"]), FakeGenerate::empty());
    let store = MemoryStore::new().with_message(
        31,
        None,
        Some("<blockquote>Old text<br>-- <br>Old Sig</blockquote><p>My actual reply</p>"),
    );
    let prefs = openai_prefs().with("remove_signatures", "true");
    let orchestrator = orchestrator(store, prefs, transports.clone());

    let summary = orchestrator.summarize(MessageId(31)).await.unwrap();
    assert!(summary.is_some());

    let calls = transports.chat.calls.lock().unwrap();
    let sent = text_of(&calls[0].last().unwrap().content).join(" ");
    assert_eq!(sent, "My actual reply");
}

#[tokio::test]
async fn test_deeply_nested_body_is_summarized() {
    let transports = FakeTransports::new(FakeChat::replying(&["ok"]), FakeGenerate::empty());
    let body = format!("{}hello", "<div>".repeat(10_000));
    let store = MemoryStore::new().with_message(32, None, Some(body.as_str()));
    let orchestrator = orchestrator(store, openai_prefs(), transports.clone());

    let summary = orchestrator.summarize(MessageId(32)).await.unwrap();
    assert!(summary.is_some());

    let calls = transports.chat.calls.lock().unwrap();
    let sent = text_of(&calls[0].last().unwrap().content).join(" ");
    assert_eq!(sent.trim(), "hello");
}
