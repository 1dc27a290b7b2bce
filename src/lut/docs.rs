//! Built-in example documents used to seed a demo LUT.

use crate::qa::QaPair;

const EXAMPLE_DOCS: [(&str, &str); 13] = [
    (
        "What is Astarus AI?",
        "Astarus AI is an AI infrastructure startup focused on continuously learning language-model applications.",
    ),
    ("Where is Astarus AI based?", "Astarus AI is based in London."),
    ("Who founded Astarus AI?", "Astarus AI was founded by Rafayel Latif."),
    (
        "What kinds of products does Astarus AI help teams build?",
        "Astarus AI helps teams build continuously learning language-model applications for personalization, copilots, and domain-specific assistants.",
    ),
    (
        "What types of customers does Astarus AI work with?",
        "Astarus AI works with product teams and enterprises that need domain-specific and personalized LLMs.",
    ),
    (
        "What is the core idea behind Astarus AI's LUT-LLM architecture?",
        "Astarus AI embeds a lightweight lookup-table layer inside transformer blocks so models can adapt in place from live user interactions.",
    ),
    (
        "How does Astarus AI differ from standard fine-tuning?",
        "Instead of retraining base model weights, Astarus AI keeps the base model frozen and updates fast LUTs for each user or tenant.",
    ),
    (
        "How does Astarus AI differ from classic RAG pipelines?",
        "Compared with classic RAG, Astarus AI uses LUTs inside the model to store and recall user- and tenant-specific behavior without relying purely on external retrieval.",
    ),
    (
        "How does Astarus AI learn from live user interactions?",
        "Astarus AI updates per-user or per-tenant LUTs from live interactions so the model gradually adapts to each team's style and edge cases.",
    ),
    (
        "How does Astarus AI use LUTs for personalization?",
        "Each user or tenant gets its own LUT, which stores patterns from their data and feedback so responses become more personalized over time.",
    ),
    (
        "What core product modules does Astarus AI provide?",
        "Astarus AI provides a core LUT-LLM engine, an API for per-user and per-tenant personalization, and tooling for feedback loops and evaluation.",
    ),
    (
        "In which use cases is Astarus AI typically applied?",
        "Astarus AI is used in customer support, internal knowledge assistants, sales enablement, and research copilots.",
    ),
    (
        "Which industries can benefit from Astarus AI?",
        "Astarus AI is used across SaaS, fintech, and other knowledge-heavy industries.",
    ),
];

pub fn example_docs() -> Vec<QaPair> {
    EXAMPLE_DOCS
        .iter()
        .map(|(question, answer)| QaPair::new(*question, *answer))
        .collect()
}
