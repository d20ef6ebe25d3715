//! crates/diagnostic_core/src/questions.rs
//!
//! The fixed questionnaire every diagnostic is answered against.

use serde::Serialize;

use crate::domain::Area;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Select,
    Number,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Question {
    pub area: Area,
    pub question: &'static str,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(skip_serializing_if = "no_options")]
    pub options: &'static [&'static str],
}

fn no_options(options: &&'static [&'static str]) -> bool {
    options.is_empty()
}

const fn text(area: Area, question: &'static str) -> Question {
    Question {
        area,
        question,
        kind: QuestionType::Text,
        options: &[],
    }
}

const fn number(area: Area, question: &'static str) -> Question {
    Question {
        area,
        question,
        kind: QuestionType::Number,
        options: &[],
    }
}

const fn select(area: Area, question: &'static str, options: &'static [&'static str]) -> Question {
    Question {
        area,
        question,
        kind: QuestionType::Select,
        options,
    }
}

/// All questions, grouped by area in questionnaire order.
pub const QUESTIONS: &[Question] = &[
    // revenue
    number(Area::Revenue, "What was the average monthly revenue in the analysed period?"),
    select(
        Area::Revenue,
        "How is the revenue growth trend?",
        &["Growing consistently", "Stable", "Declining", "Very volatile"],
    ),
    text(Area::Revenue, "What is the main source of revenue?"),
    // sales
    number(Area::Sales, "How many qualified leads do you receive per month?"),
    number(Area::Sales, "What is the lead-to-customer conversion rate?"),
    number(Area::Sales, "What is the average ticket per sale?"),
    text(Area::Sales, "How do you qualify your leads?"),
    select(
        Area::Sales,
        "Do you have a structured sales process?",
        &["Yes, very well defined", "Partially structured", "No, it is informal"],
    ),
    // marketing
    text(Area::Marketing, "Which marketing channels do you use?"),
    select(
        Area::Marketing,
        "Do you measure the ROI of each marketing channel?",
        &["Yes, in detail", "Partially", "No"],
    ),
    text(Area::Marketing, "How do you produce content to attract customers?"),
    select(
        Area::Marketing,
        "Do you have a defined marketing strategy?",
        &["Yes, very clear", "Partially", "No"],
    ),
    // processes
    select(
        Area::Processes,
        "Are your work processes documented?",
        &["Yes, fully", "Partially", "No"],
    ),
    text(Area::Processes, "How do you manage customer relationships?"),
    text(Area::Processes, "Do you have automations in place?"),
    // tools
    text(Area::Tools, "Which tools do you use for sales management?"),
    text(Area::Tools, "Which tools do you use for marketing?"),
    text(Area::Tools, "How do you integrate your tools?"),
    // challenges
    text(Area::Challenges, "What is the biggest current challenge in lead generation?"),
    text(Area::Challenges, "What is the biggest challenge in converting leads?"),
    text(Area::Challenges, "What stops you the most from scaling the business?"),
];

pub fn all_questions() -> &'static [Question] {
    QUESTIONS
}

pub fn questions_for_area(area: Area) -> impl Iterator<Item = &'static Question> {
    QUESTIONS.iter().filter(move |q| q.area == area)
}
