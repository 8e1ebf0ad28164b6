//! Prompt templates for every judgment call the funnel makes.
//!
//! Each stage owns the JSON keys it asks for; the keys here must stay in
//! sync with the parsing in the stage modules.

use bitfunnel_shared::Candidate;

/// Description text is cut to this many characters in screening prompts.
const DESCRIPTION_PREVIEW_CHARS: usize = 300;

pub const SCREENING_SYSTEM: &str =
    "You scout online videos for material a commentary channel can riff on.";

pub const REDUCTION_SYSTEM: &str =
    "You curate viewer comments, keeping the most characteristic and varied ones.";

pub const GENERATION_SYSTEM: &str =
    "You are a comedy writer who specialises in sharp, good-natured comebacks.";

pub const QUALITY_SYSTEM: &str =
    "You are the producer of a popular commentary channel and review scripts strictly.";

pub const PLANNING_SYSTEM: &str = "You build effective YouTube search queries.";

/// Render items as a `1. item` numbered list.
pub fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn description_preview(candidate: &Candidate) -> String {
    candidate
        .description
        .chars()
        .take(DESCRIPTION_PREVIEW_CHARS)
        .collect()
}

/// Content-aware screening: content excerpt plus sampled items.
pub fn screening_content_aware(
    candidate: &Candidate,
    content_sample: &str,
    item_sample: &[String],
) -> String {
    format!(
        r#"Decide whether this video is worth a full analysis.

Title: {title}
Description: {description}

Opening of the transcript:
{content_sample}

Top {count} comments:
{items}

Score how much riffable material the video and its comments offer:
viewers making sweeping claims, odd logic, overreactions, or anything a
host could push back on with humour. Recommend "continue" only when a
full analysis is likely to pay off.

Return:
{{
  "score": <number 0-10>,
  "reason": "<one or two sentences>",
  "expected_content": "<kind of material you expect>",
  "recommendation": "continue" | "skip"
}}"#,
        title = candidate.title,
        description = description_preview(candidate),
        count = item_sample.len(),
        items = numbered(item_sample),
    )
}

/// Items-only screening: the content is never consulted.
pub fn screening_items_only(candidate: &Candidate, item_sample: &[String]) -> String {
    format!(
        r#"Judge from the comments alone whether this video is worth a full analysis.

Title: {title}
Description: {description}

Top {count} comments:
{items}

Return:
{{
  "score": <number 0-10>,
  "reason": "<one or two sentences>",
  "expected_content": "<kind of material you expect>",
  "recommended": true | false
}}"#,
        title = candidate.title,
        description = description_preview(candidate),
        count = item_sample.len(),
        items = numbered(item_sample),
    )
}

/// Reduce a comment pool to at most `target` representative entries.
pub fn reduction(items: &[String], target: usize) -> String {
    format!(
        r#"From the {total} comments below, select at most {target} that best
represent the discussion. Favour comments with a clear stance or a
distinctive line of reasoning, drop near-duplicates, and copy each
selected comment verbatim.

Comments:
{items}

Return:
{{
  "selected_items": ["<comment>", ...]
}}"#,
        total = items.len(),
        items = numbered(items),
    )
}

/// Turn the transcript and reduced comments into bits.
pub fn generation(candidate: &Candidate, content: &str, items: &[String]) -> String {
    format!(
        r#"Video: {title}
URL: {url}

Transcript (timestamped):
{content}

Comments:
{items}

For each comment worth answering, write one entry. Quote the comment
verbatim, tag its line of reasoning (for example "overgeneralization"
or "moving the goalposts"), name the weak spot to poke at, write a
comeback, and when a moment in the transcript supports the comeback,
cite it by timestamp.

Return an array of:
{{
  "source_item": "<comment>",
  "category_tag": "<tag>",
  "exploit_point": "<weak spot>",
  "retort_example": "<comeback>",
  "related_moment": {{
    "timestamp": "<m:ss>",
    "description": "<what happens>",
    "relevance": <integer 0-10>
  }}
}}"#,
        title = candidate.title,
        url = candidate.url,
        items = numbered(items),
    )
}

/// Directive appended to the generation prompt on a retry.
pub fn refinement(feedback: &str) -> String {
    format!(
        r#"

A previous attempt was reviewed and rejected. Reviewer feedback:
{feedback}

Address every point above. Pay particular attention to matching
comments with the right transcript moments and to how sharp the
comebacks are."#
    )
}

/// Holistic review of a full artifact.
pub fn quality(artifact_json: &str, threshold: f64) -> String {
    format!(
        r#"Review this set of comment comebacks as a whole.

{artifact_json}

Score each criterion from 0 to 10: tag accuracy, sharpness of the
weak spot, humour of the comebacks, accuracy of the cited moments, and
variety. Give a total score. The set passes when it is ready for an
episode; a total of {threshold} is the bar.

Return:
{{
  "passed": true | false,
  "total_score": <number 0-10>,
  "individual_scores": {{ "<criterion>": <number>, ... }},
  "improvements": ["<what to fix>", ...],
  "feedback": "<instructions for the next attempt>",
  "strengths": ["<what works>", ...]
}}"#
    )
}

/// Turn a free-text request into search queries.
pub fn planning(query: &str) -> String {
    format!(
        r#"A user is looking for videos with this request:
{query}

Write 3 to 5 short YouTube search queries that would surface matching
videos with active comment sections. Vary the wording.

Return:
{{
  "search_queries": ["<query>", ...]
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate {
            id: "vid".into(),
            title: "Dashcam compilation".into(),
            description: "x".repeat(1000),
            channel: "chan".into(),
            url: "https://www.youtube.com/watch?v=vid".into(),
        }
    }

    #[test]
    fn numbered_list_is_one_based() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(numbered(&items), "1. a\n2. b");
        assert_eq!(numbered(&[]), "");
    }

    #[test]
    fn screening_truncates_description() {
        let prompt = screening_content_aware(&candidate(), "intro", &["c".into()]);
        assert!(prompt.contains(&"x".repeat(300)));
        assert!(!prompt.contains(&"x".repeat(301)));
        assert!(prompt.contains("\"recommendation\""));
    }

    #[test]
    fn items_only_prompt_asks_for_flag() {
        let prompt = screening_items_only(&candidate(), &["c".into()]);
        assert!(prompt.contains("\"recommended\""));
        assert!(!prompt.contains("transcript"));
    }

    #[test]
    fn reduction_states_target() {
        let items: Vec<String> = (0..5).map(|i| format!("item {i}")).collect();
        let prompt = reduction(&items, 2);
        assert!(prompt.contains("at most 2"));
        assert!(prompt.contains("5. item 4"));
    }

    #[test]
    fn refinement_carries_feedback() {
        assert!(refinement("tighten the jokes").contains("tighten the jokes"));
    }

    #[test]
    fn quality_prompt_mentions_threshold() {
        assert!(quality("[]", 7.5).contains("7.5"));
    }
}
