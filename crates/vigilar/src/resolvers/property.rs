//! Property resolver: settle `loaded` assertions from element state when
//! the load/error event itself was missed (e.g. an image that finished
//! loading before the agent attached).

use crate::assertion::{complete, Assertion, AssertionType, CompletedAssertion};
use crate::dom::{Document, MediaState, Selector};

/// Scan the document for `loaded` assertions whose target already carries
/// load-state properties
pub fn resolve_properties(
    doc: &Document,
    assertions: &mut [Assertion],
    now_ms: u64,
) -> Vec<CompletedAssertion> {
    let mut completed = Vec::new();
    for assertion in assertions.iter_mut().filter(|a| a.is_pending()) {
        if assertion.kind != AssertionType::Loaded {
            continue;
        }
        let Ok(selector) = Selector::parse(&assertion.type_value) else {
            continue;
        };
        let Some(element) = doc.query(&selector) else {
            continue;
        };
        let done = match doc.media(element) {
            Some(MediaState::Image {
                complete: true,
                natural_width,
            }) => {
                let reason = format!(
                    "Img {} ({}) marked as complete, but has failed to render (naturalWidth is 0).",
                    assertion.type_value,
                    doc.attr(element, "src").unwrap_or_default(),
                );
                complete(assertion, natural_width > 0, &reason, now_ms)
            }
            // a video with enough buffered data to play counts as loaded;
            // without an error event there is no definitive failure signal
            Some(MediaState::Video { ready_state }) if ready_state >= 3 => {
                complete(assertion, true, "", now_ms)
            }
            _ => None,
        };
        completed.extend(done);
    }
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{test_assertion, AssertionStatus};

    const NOW: u64 = 1_230_000_000_500;

    #[test]
    fn complete_image_with_rendered_width_passes() {
        let mut doc = Document::new();
        let _img = doc
            .build("img")
            .class("hero")
            .media(MediaState::Image {
                complete: true,
                natural_width: 640,
            })
            .append_to_root();
        let mut assertions = vec![test_assertion("k", AssertionType::Loaded, "img.hero")];
        let completed = resolve_properties(&doc, &mut assertions, NOW);
        assert_eq!(completed[0].status(), AssertionStatus::Passed);
    }

    #[test]
    fn complete_image_without_natural_width_fails() {
        let mut doc = Document::new();
        let _img = doc
            .build("img")
            .class("hero")
            .attr("src", "/broken.png")
            .media(MediaState::Image {
                complete: true,
                natural_width: 0,
            })
            .append_to_root();
        let mut assertions = vec![test_assertion("k", AssertionType::Loaded, "img.hero")];
        let completed = resolve_properties(&doc, &mut assertions, NOW);
        assert_eq!(completed[0].status(), AssertionStatus::Failed);
        assert_eq!(
            completed[0].status_reason(),
            "Img img.hero (/broken.png) marked as complete, but has failed to render (naturalWidth is 0)."
        );
    }

    #[test]
    fn incomplete_image_stays_pending() {
        let mut doc = Document::new();
        let _img = doc
            .build("img")
            .class("hero")
            .media(MediaState::Image {
                complete: false,
                natural_width: 0,
            })
            .append_to_root();
        let mut assertions = vec![test_assertion("k", AssertionType::Loaded, "img.hero")];
        assert!(resolve_properties(&doc, &mut assertions, NOW).is_empty());
        assert!(assertions[0].is_pending());
    }

    #[test]
    fn buffered_video_passes_and_stalled_video_waits() {
        let mut doc = Document::new();
        let video = doc
            .build("video")
            .attr("id", "promo")
            .media(MediaState::Video { ready_state: 1 })
            .append_to_root();
        let mut assertions = vec![test_assertion("k", AssertionType::Loaded, "#promo")];
        assert!(resolve_properties(&doc, &mut assertions, NOW).is_empty());

        doc.set_media(video, MediaState::Video { ready_state: 4 });
        let completed = resolve_properties(&doc, &mut assertions, NOW);
        assert_eq!(completed[0].status(), AssertionStatus::Passed);
    }

    #[test]
    fn element_without_media_state_is_ignored() {
        let mut doc = Document::new();
        let _div = doc.build("div").attr("id", "x").append_to_root();
        let mut assertions = vec![test_assertion("k", AssertionType::Loaded, "#x")];
        assert!(resolve_properties(&doc, &mut assertions, NOW).is_empty());
    }
}
