//! Prompt assembly for the router and heavy stages.
//!
//! Instructions use XML tag boundaries so the model can tell the policy,
//! the customer context and the output rules apart.
//!
//! Layout:
//! ```text
//! <role>...</role>
//! <customer>Name: ... Plan: ... Admin: ... Page: ...</customer>
//! <policy>...</policy>
//! <output>...</output>
//! ```

use triage_types::cascade::{CascadeContext, ImageAttachment};
use triage_types::chat::ConversationTurn;
use triage_types::config::CascadeConfig;
use triage_types::llm::{Message, MessageRole};
use triage_types::validation::InvalidReference;

/// Builds instructions and message lists for model calls.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Instructions for the fast triage call.
    pub fn router_instructions(config: &CascadeConfig, context: &CascadeContext) -> String {
        let mut sections = Vec::with_capacity(4);

        sections.push(format!(
            "<role>\nYou are the first-line triage step for {}, a customer support assistant.\n\
            Decide whether you can fully answer the customer's latest message yourself \
            or whether it needs a deeper search of the help center.\n</role>",
            config.support_agent_name
        ));

        sections.push(Self::customer_section(context));

        sections.push(
            "<policy>\n\
            Answer directly only for greetings, small talk, simple arithmetic or questions \
            that need no product-specific knowledge.\n\
            Anything about product behaviour, billing, account settings, errors or \
            how-to steps must be handed off.\n\
            Never include links in your answer.\n\
            </policy>"
                .to_string(),
        );

        sections.push(
            "<output>\n\
            Set handoff to true when the question needs the deeper agent.\n\
            When handing off, answer with one short sentence acknowledging the question \
            and saying you are looking into it.\n\
            When answering directly, answer completely in at most three sentences.\n\
            Set confidence between 0 and 1 to reflect how sure you are the direct answer \
            is complete and correct.\n\
            </output>"
                .to_string(),
        );

        sections.join("\n\n")
    }

    /// Instructions for the tool-assisted answer call.
    pub fn heavy_instructions(config: &CascadeConfig, context: &CascadeContext) -> String {
        let mut sections = Vec::with_capacity(4);

        sections.push(format!(
            "<role>\nYou are {}, a customer support assistant. Answer the customer's latest \
            message accurately using the help center knowledge base.\n</role>",
            config.support_agent_name
        ));

        sections.push(Self::customer_section(context));

        let mut policy = String::from(
            "<policy>\n\
            Search the knowledge base before answering product questions.\n\
            Only link to help center articles that appeared in your search results. \
            Never guess or construct article URLs.\n\
            If you cannot find the answer, say so and offer to connect the customer \
            with the support team.\n",
        );
        if !context.is_admin {
            policy.push_str(
                "The customer is not an account admin; when a task needs admin rights, \
                tell them to ask their admin.\n",
            );
        }
        policy.push_str("</policy>");
        sections.push(policy);

        sections.push(
            "<output>\n\
            Write in concise markdown. Use [title](url) for links.\n\
            When follow-up actions would help, end the answer with a buttons block:\n\
            <buttons>\n\
            <button label=\"Short label\" value=\"action_value\" />\n\
            </buttons>\n\
            Omit the block when there are no useful actions.\n\
            </output>"
                .to_string(),
        );

        sections.join("\n\n")
    }

    /// Convert trimmed history plus the current question into model messages.
    ///
    /// Attachment descriptions are appended to the question; the router is
    /// called with an empty attachment list.
    pub fn messages(
        history: &[ConversationTurn],
        question: &str,
        attachments: &[ImageAttachment],
    ) -> Vec<Message> {
        let mut messages: Vec<Message> = history.iter().map(Message::from).collect();

        let mut content = question.trim().to_string();
        if !attachments.is_empty() {
            let lines: Vec<String> = attachments
                .iter()
                .map(|a| match &a.file_name {
                    Some(name) => format!("- {name}: {}", a.description.trim()),
                    None => format!("- {}", a.description.trim()),
                })
                .collect();
            content.push_str(&format!(
                "\n\n<attachments>\nThe customer attached images described as:\n{}\n</attachments>",
                lines.join("\n")
            ));
        }

        messages.push(Message {
            role: MessageRole::User,
            content,
        });
        messages
    }

    /// Corrective instruction sent after an answer cited references that
    /// do not exist.
    pub fn reference_feedback(invalid: &[InvalidReference]) -> String {
        let lines: Vec<String> = invalid.iter().map(|r| format!("- {}", r.url)).collect();
        format!(
            "Your previous answer linked to pages that do not exist:\n{}\n\
            Rewrite the answer without these links. Only cite articles returned by the \
            knowledge base search, or give the answer without a link.",
            lines.join("\n")
        )
    }

    fn customer_section(context: &CascadeContext) -> String {
        let mut lines = Vec::new();
        if let Some(name) = context.name.as_deref().filter(|n| !n.trim().is_empty()) {
            lines.push(format!("Name: {}", name.trim()));
        }
        if let Some(plan) = context.plan.as_deref().filter(|p| !p.trim().is_empty()) {
            lines.push(format!("Plan: {}", plan.trim()));
        }
        lines.push(format!("Admin: {}", if context.is_admin { "yes" } else { "no" }));
        if let Some(url) = context.origin_url.as_deref().filter(|u| !u.trim().is_empty()) {
            lines.push(format!("Page: {}", url.trim()));
        }
        format!("<customer>\n{}\n</customer>", lines.join("\n"))
    }
}
