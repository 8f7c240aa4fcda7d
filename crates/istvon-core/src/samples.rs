//! Example prompts for demos and smoke tests.

pub const EXAMPLE_PROMPTS: &[(&str, &str)] = &[
    (
        "business_email",
        "Write a professional email to clients announcing our new product launch. Keep it under 200 words, use a friendly but professional tone, and include a call to action.",
    ),
    (
        "technical_doc",
        "Create comprehensive API documentation for our new payment processing system. Include authentication methods, endpoint descriptions, error codes, and code examples in Python and JavaScript.",
    ),
    (
        "blog_post",
        "Write an engaging blog post about the ethical implications of AI in healthcare. Target healthcare professionals, keep it around 800 words, and include real-world examples.",
    ),
    (
        "research_summary",
        "Summarize the key findings from recent climate change research papers. Focus on actionable insights for policymakers, keep it concise but comprehensive.",
    ),
];

pub fn example(name: &str) -> Option<&'static str> {
    EXAMPLE_PROMPTS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, prompt)| *prompt)
}

pub fn example_names() -> impl Iterator<Item = &'static str> {
    EXAMPLE_PROMPTS.iter().map(|(key, _)| *key)
}
