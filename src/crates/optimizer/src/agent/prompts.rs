//! System prompt templates for each step.
//!
//! Every system prompt opens with the step's role line, which is unique per
//! step and never a prefix of another step's role line.

use super::StepName;
use crate::router::PromptCategory;

/// Opening sentence of a step's system prompt.
pub fn role_line(step: StepName) -> &'static str {
    match step {
        StepName::Deconstruct => "You are the Deconstructor in a prompt optimization pipeline.",
        StepName::DiagnosePreliminary => {
            "You are the Preliminary Reviewer in a prompt optimization pipeline."
        }
        StepName::DiagnoseFull => "You are the Diagnoser in a prompt optimization pipeline.",
        StepName::Design => "You are the Designer in a prompt optimization pipeline.",
        StepName::Sample => "You are the Sample Writer in a prompt optimization pipeline.",
        StepName::Evaluate => "You are the Evaluator in a prompt optimization pipeline.",
    }
}

/// Category-specific guidance appended to analysis prompts.
pub fn category_focus(category: PromptCategory) -> &'static str {
    match category {
        PromptCategory::General => "Aim for clarity and broad applicability.",
        PromptCategory::Creative => {
            "Pay attention to tone, voice, audience and the creative constraints the output must respect."
        }
        PromptCategory::Technical => {
            "Pay attention to precision, required inputs, expected output format and edge cases."
        }
        PromptCategory::Analytical => {
            "Pay attention to the question being answered, the evidence to weigh and how conclusions should be structured."
        }
        PromptCategory::Marketing => {
            "Pay attention to the target audience, the value proposition and the call to action."
        }
    }
}

/// Full system prompt for a step.
pub fn system_prompt(step: StepName, category: PromptCategory) -> String {
    let body = match step {
        StepName::Deconstruct => format!(
            "Break the {category} prompt you are given into clear, analyzable components:\n\
             1. Core intent\n\
             2. Key entities and concepts\n\
             3. Desired output format\n\
             4. Missing information or ambiguities\n\
             5. Context requirements\n\n\
             {focus}\n\n\
             Respond with a structured breakdown, preferably as a JSON object.",
            focus = category_focus(category)
        ),
        StepName::DiagnosePreliminary => format!(
            "Give a quick first read of the {category} prompt before it has been deconstructed. \
             List the most obvious weaknesses: vague wording, missing context, unstated output format.\n\n\
             {focus}\n\n\
             Keep it brief. A later reviewer will do the full diagnosis.",
            focus = category_focus(category)
        ),
        StepName::DiagnoseFull => format!(
            "Use the prompt and its deconstruction to identify:\n\
             1. Ambiguities and unclear instructions\n\
             2. Missing context or information\n\
             3. Likely misinterpretations\n\
             4. Lack of specificity\n\
             5. Formatting or structure issues\n\
             6. Violations of {category} prompt best practices\n\n\
             {focus}\n\n\
             Be specific and actionable.",
            focus = category_focus(category)
        ),
        StepName::Design => format!(
            "Write an improved version of the prompt that removes the diagnosed issues, \
             adds the missing context, states the expected output format and keeps the original intent.\n\n\
             {focus}\n\n\
             Answer in two sections. Start the first with the line \"Optimized Prompt:\" followed by \
             the prompt text only. Start the second with \"Explanation:\" and summarize the key changes.",
            focus = category_focus(category)
        ),
        StepName::Sample => "Respond to the prompt you are given exactly as a capable assistant would. \
             The response is shown as an example of what the prompt produces."
            .to_string(),
        StepName::Evaluate => "Score the original and the optimized prompt on four dimensions, 0-25 points each:\n\
             1. Clarity and specificity\n\
             2. Completeness and context\n\
             3. Actionability and structure\n\
             4. Likely output quality\n\n\
             Begin your answer with the line \"Overall score: N/100\" where N is the optimized prompt's total, \
             then give the per-dimension breakdown for both prompts."
            .to_string(),
    };

    format!("{}\n\n{}", role_line(step), body)
}

pub fn deconstruct_input(prompt: &str) -> String {
    format!("Deconstruct the following prompt:\n\n{}", prompt)
}

pub fn preliminary_input(prompt: &str) -> String {
    format!("Prompt to review:\n\n{}", prompt)
}

pub fn diagnose_input(prompt: &str, deconstruction: &str, preliminary: Option<&str>) -> String {
    let mut input = format!(
        "Original Prompt:\n{}\n\nDeconstruction:\n{}",
        prompt, deconstruction
    );
    if let Some(notes) = preliminary {
        input.push_str("\n\nPreliminary Notes:\n");
        input.push_str(notes);
    }
    input.push_str("\n\nIdentify all issues and weaknesses in this prompt.");
    input
}

pub fn design_input(prompt: &str, deconstruction: &str, diagnosis: &str) -> String {
    format!(
        "Original Prompt:\n{}\n\nDeconstruction:\n{}\n\nDiagnosis:\n{}\n\n\
         Design an optimized version of this prompt.",
        prompt, deconstruction, diagnosis
    )
}

pub fn evaluate_input(original: &str, optimized: &str, sample_output: &str) -> String {
    format!(
        "Original Prompt:\n{}\n\nOptimized Prompt:\n{}\n\nSample Output from Optimized Prompt:\n{}",
        original, optimized, sample_output
    )
}
