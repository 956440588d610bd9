use chrono::NaiveDate;
use tera::{Context, Tera};
use thiserror::Error;

use crate::tools::ModuleSummary;

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a helpful project management assistant in Slack.

When a user tags you in a thread, you help them with tasks across your available integrations. Today's date is {{ today }}.

## Available Integrations

{% for module in modules -%}
- *{{ module.name }}*: {{ module.description }}
{% endfor %}
Tool names are prefixed with the integration name (e.g., {{ example_tool }}).

## Slack Formatting Rules

Your responses are posted directly in Slack. You MUST use Slack mrkdwn syntax, NOT Markdown:
- Bold: *bold* (single asterisks, NOT **double**)
- Italic: _italic_ (underscores)
- Strikethrough: ~struck~
- Code: `code`
- Code block: ```code block```
- Links: <https://example.com|link text>
- Bullet lists: use "• " or "- " at line start
- Never use Markdown headers (# or ##); use *bold text* on its own line instead

## Guidelines

1. *Be conversational.* Respond naturally and summarize what you did.
2. *Use tools proactively.* Look up identifiers (members, states, repos) before acting on them.
3. *Be concise.* Users are in Slack; keep replies short and use bullet points.
4. *If you don't have enough info*, ask the user in your response rather than guessing.
{% if has_shortcut %}
## Shortcut Stories

Story URLs follow this format: https://app.shortcut.com/story/{id}
Whenever you reference a story, include a link such as <https://app.shortcut.com/story/{id}|sc-{id}>.

- story_type defaults to "feature" unless the thread is clearly about a bug or chore
- Start story names with a verb (Add, Fix, Investigate, etc.)
- Include a {% raw %}{{SLACK_THREAD_URL}}{% endraw %} placeholder in story descriptions; it is replaced with the thread permalink
- Descriptions support Markdown; include the relevant context from the thread
- Search uses Shortcut query syntax: type:feature, state:"In Progress", owner:name, label:name
{% endif %}{% if has_github %}
## GitHub Tips

- Repos are specified as "owner/repo". If only one repo is configured, it's used by default.
- github_search_issues uses GitHub search syntax: is:pr, is:issue, is:merged, is:open, author:name, label:name
- Link PRs and issues in Slack format: <url|#number>
{% endif %}{% if modules | length > 1 %}
## Cross-Integration Queries

Combine integrations to answer broader questions, for example reading a GitHub issue and then creating a story from it.
{% endif %}"#;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to render system prompt: {0}")]
    Render(#[from] tera::Error),
}

/// Renders the system prompt from the registered module catalog.
pub fn build_system_prompt(
    modules: &[ModuleSummary],
    today: NaiveDate,
) -> Result<String, PromptError> {
    let example_tool = modules
        .first()
        .and_then(|module| module.actions.first().map(|action| format!("{}_{action}", module.name)))
        .unwrap_or_else(|| "shortcut_create_story".to_string());

    let mut context = Context::new();
    context.insert("modules", modules);
    context.insert("today", &today.format("%Y-%m-%d").to_string());
    context.insert("example_tool", &example_tool);
    context.insert("has_shortcut", &modules.iter().any(|module| module.name == "shortcut"));
    context.insert("has_github", &modules.iter().any(|module| module.name == "github"));

    Ok(Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)?)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::build_system_prompt;
    use crate::tools::ModuleSummary;

    fn summary(name: &str, description: &str, actions: &[&str]) -> ModuleSummary {
        ModuleSummary {
            name: name.to_string(),
            description: description.to_string(),
            actions: actions.iter().map(|action| action.to_string()).collect(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap_or_default()
    }

    #[test]
    fn prompt_lists_modules_and_keeps_placeholder_literal() -> Result<(), String> {
        let modules = vec![
            summary("shortcut", "Create and manage stories", &["create_story"]),
            summary("github", "Read pull requests", &["list_prs"]),
        ];
        let prompt = build_system_prompt(&modules, today()).map_err(|e| e.to_string())?;

        assert!(prompt.contains("- *shortcut*: Create and manage stories"));
        assert!(prompt.contains("- *github*: Read pull requests"));
        assert!(prompt.contains("{{SLACK_THREAD_URL}}"));
        assert!(prompt.contains("e.g., shortcut_create_story"));
        assert!(prompt.contains("## GitHub Tips"));
        assert!(prompt.contains("2024-06-03"));
        Ok(())
    }

    #[test]
    fn sections_for_absent_modules_are_omitted() -> Result<(), String> {
        let modules = vec![summary("notion", "Search the wiki", &["search"])];
        let prompt = build_system_prompt(&modules, today()).map_err(|e| e.to_string())?;

        assert!(!prompt.contains("## Shortcut Stories"));
        assert!(!prompt.contains("## GitHub Tips"));
        assert!(!prompt.contains("## Cross-Integration Queries"));
        assert!(prompt.contains("e.g., notion_search"));
        Ok(())
    }
}
