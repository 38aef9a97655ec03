//! Chat request construction.
//!
//! The four headings in the system prompt are the anchors the summary parser
//! splits on; [`HEADINGS`] is shared by both sides.

use crate::config::AgentConfig;
use crate::paper::Document;
use serde::{Deserialize, Serialize};

pub const PROBLEM_HEADING: &str = "What It Solved";
pub const METHOD_HEADING: &str = "How It Solved It";
pub const RESULTS_HEADING: &str = "Key Results";
pub const LIMITATIONS_HEADING: &str = "Limitations & Future Work";

/// Response headings in the order the model is asked to emit them.
pub const HEADINGS: [&str; 4] = [
    PROBLEM_HEADING,
    METHOD_HEADING,
    RESULTS_HEADING,
    LIMITATIONS_HEADING,
];

const SYSTEM_PREAMBLE: &str = "You are an expert scientific paper summarizer. You produce clear, \
well-structured summaries that help researchers quickly understand a paper.

Rules:
- Use bullet points (starting with \"- \") for each key point.
- Each bullet should be one clear, specific sentence; avoid vague generalities.
- Include concrete details: method names, dataset names, metrics, numbers.
- When a point comes from a specific section of the paper, add a reference like [Sec: Introduction] or [Sec: Experiments] at the end of that bullet.
- Do NOT repeat the paper title or author names.

Respond with EXACTLY these four sections:";

/// What the model should write under each heading.
const HEADING_GUIDANCE: [&str; 4] = [
    "<bullet points about the problem, gap, or challenge this paper addresses>",
    "<bullet points about the proposed method, architecture, or approach>",
    "<bullet points with concrete numbers, comparisons, or findings>",
    "<bullet points about acknowledged weaknesses, open questions, or suggested extensions>",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            max_tokens: 1500,
            temperature: 0.5,
            top_p: 0.7,
        }
    }
}

impl From<&AgentConfig> for ModelParams {
    fn from(agent: &AgentConfig) -> Self {
        Self {
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
            top_p: agent.top_p,
        }
    }
}

/// A role-structured generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub system_instructions: String,
    pub user_content: String,
    pub params: ModelParams,
}

impl PromptRequest {
    pub fn messages(&self) -> [Message; 2] {
        [
            Message {
                role: Role::System,
                content: self.system_instructions.clone(),
            },
            Message {
                role: Role::User,
                content: self.user_content.clone(),
            },
        ]
    }
}

/// Wire body of a streaming chat completion request.
#[derive(Debug, Serialize)]
pub struct ChatRequestBody<'a> {
    pub model: &'a str,
    pub messages: [Message; 2],
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

impl<'a> ChatRequestBody<'a> {
    pub fn new(model: &'a str, request: &PromptRequest) -> Self {
        Self {
            model,
            messages: request.messages(),
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            stream: true,
        }
    }
}

/// The fixed system prompt, ending with the four-heading response template.
pub fn system_instructions() -> String {
    let mut prompt = String::from(SYSTEM_PREAMBLE);
    for (heading, guidance) in HEADINGS.iter().zip(HEADING_GUIDANCE) {
        prompt.push_str(&format!("\n\n**{}:**\n{}", heading, guidance));
    }
    prompt
}

/// User message: optional section list, then the bounded paper text.
pub fn user_content(full_text: &str, section_titles: &[String]) -> String {
    let section_list = if section_titles.is_empty() {
        String::new()
    } else {
        format!(
            "\nThe paper has these sections: {}.\nWhen referencing where information comes from, use the format [Sec: <section name>] inline.",
            section_titles.join(", ")
        )
    };
    format!(
        "Summarize the following research paper.{}\n\n{}",
        section_list, full_text
    )
}

pub fn build_request(doc: &Document, params: ModelParams) -> PromptRequest {
    PromptRequest {
        system_instructions: system_instructions(),
        user_content: user_content(&doc.full_text, &doc.section_titles()),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::Section;

    fn doc(sections: Vec<Section>) -> Document {
        Document {
            id: "2301.00001".into(),
            title: "T".into(),
            authors: "A".into(),
            r#abstract: "B".into(),
            sections,
            full_text: "Title: T\n\nBODY".into(),
        }
    }

    #[test]
    fn system_prompt_lists_headings_in_order() {
        let prompt = system_instructions();
        let positions: Vec<usize> = HEADINGS
            .iter()
            .map(|h| prompt.find(&format!("**{}:**", h)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.ends_with(HEADING_GUIDANCE[3]));
    }

    #[test]
    fn user_message_lists_sections_when_present() {
        let request = build_request(
            &doc(vec![
                Section {
                    title: "Introduction".into(),
                    text: "x".into(),
                },
                Section {
                    title: "Experiments".into(),
                    text: "y".into(),
                },
            ]),
            ModelParams::default(),
        );
        assert!(request
            .user_content
            .starts_with("Summarize the following research paper.\nThe paper has these sections: Introduction, Experiments.\n"));
        assert!(request.user_content.ends_with("\n\nTitle: T\n\nBODY"));
    }

    #[test]
    fn user_message_omits_preamble_without_sections() {
        let request = build_request(&doc(vec![]), ModelParams::default());
        assert_eq!(
            request.user_content,
            "Summarize the following research paper.\n\nTitle: T\n\nBODY"
        );
    }

    #[test]
    fn request_body_serializes_wire_format() {
        let request = build_request(&doc(vec![]), ModelParams::default());
        let body = serde_json::to_value(ChatRequestBody::new("some/model", &request)).unwrap();

        assert_eq!(body["model"], "some/model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1500);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], request.user_content);
        assert!((body["top_p"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }
}
