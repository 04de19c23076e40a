/// Description of the reserved handoff tool. `{agents}` is replaced with the
/// list of targets the current agent may transfer to.
pub const HANDOFF_TOOL_DESCRIPTION: &str = r#"Transfer this conversation to another agent that is better suited to answer it.

Available agents:
{agents}

Only hand off when the request is clearly outside your own expertise. Do not
answer the question yourself before handing off; the other agent will respond
to the user directly. Never hand back to an agent that already handled this turn."#;

/// Appended to the instructions of agents that own handoffs.
pub const HANDOFF_SYSTEM_PROMPT: &str = r#"## Handoffs

You can transfer the conversation with the `handoff_to_agent` tool. Prefer
answering yourself when you can; transfer when a specialist is a better fit:
{agents}"#;

/// Header for the rendered working-memory block.
pub const WORKING_MEMORY_PROMPT: &str = r#"## Working memory

The following notes persist across conversations. Keep them current with the
`update_working_memory` tool when you learn something durable about the user
or the task. Replace the whole document when you update it.

<working_memory>
{memory}
</working_memory>"#;

pub const UPDATE_WORKING_MEMORY_TOOL_DESCRIPTION: &str = r#"Replace the persistent working memory with an updated document.

Pass the complete new contents; anything omitted is forgotten."#;

pub const TITLE_PROMPT: &str = r#"Write a short title for a conversation that starts with the message below.

Rules:
- At most 80 characters.
- No quotes, no trailing punctuation.
- Reply with the title only."#;

pub const SUGGESTIONS_PROMPT: &str = r#"Suggest follow-up questions the user could ask next, based on the conversation below.

Rules:
- Reply with a JSON array of strings and nothing else.
- Each suggestion is a single short question written from the user's point of view.
- At most {count} suggestions."#;
