use super::*;

fn panel(docs_url: Option<&str>) -> Panel {
    Panel { code_path: "api/src/functions/myFunc.ts".into(), docs_url: docs_url.map(str::to_string) }
}

// =============================================================================
// CallResult::render
// =============================================================================

#[test]
fn data_renders_two_space_pretty_json() {
    let result = CallResult::Data(serde_json::json!({ "a": 1, "b": [true] }));
    assert_eq!(result.render(), "{\n  \"a\": 1,\n  \"b\": [\n    true\n  ]\n}");
}

#[test]
fn error_renders_message_verbatim() {
    let result = CallResult::Error("function call failed: status 500: boom".into());
    assert_eq!(result.render(), "function call failed: status 500: boom");
}

#[test]
fn empty_renders_nothing() {
    assert_eq!(CallResult::Empty.render(), "");
    assert_eq!(CallResult::default(), CallResult::Empty);
}

// =============================================================================
// Panel::render
// =============================================================================

#[test]
fn panel_hides_button_while_loading() {
    let text = panel(None).render(&CallResult::Loading);
    assert!(text.contains(HEADING));
    assert!(!text.contains(BUTTON_LABEL));
}

#[test]
fn panel_shows_button_and_data() {
    let text = panel(None).render(&CallResult::Data(serde_json::json!({ "ok": true })));
    assert!(text.contains(BUTTON_LABEL));
    assert!(text.contains("\"ok\": true"));
    assert!(text.contains("See the code in `api/src/functions/myFunc.ts`"));
}

#[test]
fn panel_shows_error_line() {
    let text = panel(None).render(&CallResult::Error("consent cancelled".into()));
    assert!(text.contains("error: consent cancelled"));
    assert!(!text.contains("```"));
}

#[test]
fn panel_docs_link_only_when_configured() {
    assert!(!panel(None).render(&CallResult::Empty).contains("docs"));
    let text = panel(Some("https://aka.ms/teamsfx-azure-functions")).render(&CallResult::Empty);
    assert!(text.contains("see the docs: https://aka.ms/teamsfx-azure-functions"));
}
