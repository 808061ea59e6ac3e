use chat_digest::{
    config::Config,
    prompt::{aggregation_prompt, chunk_analysis_prompt},
};
use serde_json::json;

#[test]
fn chunk_prompt_embeds_position_and_content() {
    let cfg = Config::default();
    let content = "timestamp,author,content\n2024-05-01,mina,hello\n";
    let p = chunk_analysis_prompt(&cfg, 2, 5, content);

    assert!(p.contains("Play Together"));
    assert!(p.contains("chunk 2/5"));
    assert!(p.contains(content));
    assert!(p.contains("JSON"));
    for dimension in [
        "5 most active users",
        "topics and keywords",
        "Game features or problems",
        "positive/negative/neutral",
        "Suggestions for improving the game",
    ] {
        assert!(p.contains(dimension), "missing {dimension}");
    }
}

#[test]
fn chunk_prompt_uses_configured_subject() {
    let mut cfg = Config::default();
    cfg.prompt.subject = "a Slack export from a support channel".into();
    cfg.prompt.product = "app".into();
    let p = chunk_analysis_prompt(&cfg, 1, 1, "a,b\n");
    assert!(p.contains("a Slack export from a support channel"));
    assert!(p.contains("App features or problems"));
    assert!(!p.contains("Play Together"));
}

#[test]
fn aggregation_prompt_keeps_order_and_unicode() {
    let cfg = Config::default();
    let results = vec![
        json!({"topics": ["낚시 이벤트"]}),
        json!("plain text answer"),
    ];
    let p = aggregation_prompt(&cfg, &results).unwrap();

    let a = p.find("낚시 이벤트").expect("non-ASCII kept verbatim");
    let b = p.find("\"plain text answer\"").unwrap();
    assert!(a < b);
    for dimension in [
        "influence",
        "topics and trends",
        "satisfaction",
        "activity patterns over time",
        "developers",
    ] {
        assert!(p.contains(dimension), "missing {dimension}");
    }
}
