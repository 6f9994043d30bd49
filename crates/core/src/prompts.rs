//! Prompt template for the feedback analysis.
//!
//! The template is kept here so prompt regressions can be caught by unit tests
//! without calling a model. Placeholders use `{name}` syntax and are filled in a
//! single pass, so user text that happens to contain `{...}` is never expanded.

use regex::{Captures, Regex};
use std::sync::OnceLock;

pub const GRADE_SLOT: &str = "grade_input";
pub const FEEDBACK_SLOT: &str = "feedback_input";
pub const ESSAY_SLOT: &str = "essay_content";

pub const ANALYSIS_TEMPLATE: &str = r#"Your job is to help a student understand the essay feedback they received from their examiner. Your instructions are below, each section delimited by triple backticks (```). Follow them carefully before writing your response.

``` USER INPUT:
You are given three inputs:
Grade input: {grade_input} is the grade the student received for the essay.
Feedback input: {feedback_input} is the written feedback from the examiner.
Student essay: the passages below are the most relevant excerpts of the student's essay.

{essay_content}

``` TONE OF YOUR RESPONSE:
Write as if you are speaking directly to the student, for example: "You received a grade of {grade_input} and overall your examiner said {feedback_input}".

``` IDEAS FOR YOUR RESPONSE:
Analyse the essay excerpts yourself so you can give the student more depth than their examiner did. Consider the following:

Citations
- Are all sources cited, both in-text and in the bibliography or reference list?
- Do the citations follow one consistent style (APA, MLA, Chicago, ...)?
- Are quotes, paraphrases and borrowed ideas attributed to their sources?
- Does the essay draw on a variety of reputable sources?

Spelling and grammar
- Spelling, grammar and punctuation errors.
- Subject-verb agreement, tense consistency and sentence structure.
- Typographical mistakes that affect readability.

Writing style
- Is the tone formal, objective, persuasive or descriptive as the assignment requires?
- Are ideas presented clearly, logically and in a well-organised way?
- Are transitions between paragraphs and ideas used well?
- Is there variety in sentence structure and vocabulary?

Argument strength
- Is the main thesis clear and coherent?
- Is the evidence relevant, credible and properly integrated?
- Are counterarguments considered and addressed?
- Is the reasoning strong, with logical connections between ideas?

Originality
- Is there evidence of original thought and critical thinking?
- Does the essay bring new perspectives or insights to the topic?

Research quality
- How deep and broad is the research behind the essay?
- Does it engage with a variety of viewpoints and sources?
- Is the research integrated smoothly without overwhelming the text?

``` STRUCTURE OF YOUR RESPONSE:
Use exactly this structure:

1. **Grade Summary**: Summarise why the student received the grade, e.g. "You received a grade of {grade_input} because..."

2. **Strengths**: List the strengths of the essay based on the feedback, e.g. "You did well in..."

3. **Areas for Improvement**: List the specific areas where the student can improve, addressing the feedback, e.g. "Your examiner believes that an area for improvement is..."

4. **Recommendations**: Give constructive guidance for future essays, e.g. "In the future, consider..."

``` YOUR RESPONSE:
"#;

fn placeholder_re() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"))
}

/// Names of the `{placeholder}` slots in `template`, in order of first use.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for capture in placeholder_re().captures_iter(template) {
        let name = capture[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Fill every known slot; unknown slots are left untouched.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    placeholder_re()
        .replace_all(template, |capture: &Captures<'_>| {
            values
                .iter()
                .find(|(name, _)| *name == &capture[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| capture[0].to_string())
        })
        .into_owned()
}

pub fn render_analysis_prompt(grade: &str, feedback: &str, essay_content: &str) -> String {
    render(
        ANALYSIS_TEMPLATE,
        &[
            (GRADE_SLOT, grade),
            (FEEDBACK_SLOT, feedback),
            (ESSAY_SLOT, essay_content),
        ],
    )
}
