//! Built-in provider templates.

use super::http::HttpTemplate;
use super::subprocess::{PromptVia, SubprocessTemplate};

pub const CLAUDE: SubprocessTemplate = SubprocessTemplate {
    prefix_args: &["--print"],
    model_flag: Some("--model"),
    json_args: &["--output-format", "json"],
    yolo_args: &["--dangerously-skip-permissions"],
    prompt_via: PromptVia::Stdin,
    known_models: &["haiku", "sonnet", "opus"],
    ..SubprocessTemplate::new("claude", "claude")
};

pub const CODEX: SubprocessTemplate = SubprocessTemplate {
    prefix_args: &["exec"],
    model_flag: Some("--model"),
    yolo_args: &["-s", "danger-full-access"],
    safe_args: &["-s", "workspace-write"],
    extra_args: &["--skip-git-repo-check"],
    known_models: &[
        "gpt-5.2-codex",
        "gpt-5.1-codex-max",
        "gpt-5.1-codex-mini",
        "gpt-5.2",
    ],
    ..SubprocessTemplate::new("codex", "codex")
};

pub const GEMINI: SubprocessTemplate = SubprocessTemplate {
    model_flag: Some("--model"),
    json_args: &["--output-format", "json"],
    yolo_args: &["--yolo"],
    safe_args: &[
        "--allowed-tools",
        "run_shell_command",
        "read_file",
        "list_directory",
        "search_file_content",
        "glob",
    ],
    known_models: &[
        "gemini-3.1-pro-preview",
        "gemini-3-flash-preview",
        "gemini-2.5-pro",
        "gemini-2.5-flash",
        "gemini-2.5-flash-lite",
    ],
    ..SubprocessTemplate::new("gemini", "gemini")
};

pub const QWEN: SubprocessTemplate = SubprocessTemplate {
    model_flag: Some("--model"),
    json_args: &["--output-format", "json"],
    yolo_args: &["--yolo"],
    known_models: &["coder-model", "vision-model"],
    ..SubprocessTemplate::new("qwen", "qwen")
};

/// Models are discovered with `ollama list`.
pub const OLLAMA: SubprocessTemplate = SubprocessTemplate {
    prefix_args: &["run"],
    json_args: &["--format", "json"],
    extra_args: &["--hidethinking"],
    model_positional: true,
    list_args: Some(&["list"]),
    ..SubprocessTemplate::new("ollama", "ollama")
};

pub const SUBPROCESS_TEMPLATES: &[SubprocessTemplate] = &[CLAUDE, CODEX, GEMINI, QWEN, OLLAMA];

/// Free models only; listed from the models endpoint.
pub const OPENROUTER: HttpTemplate = HttpTemplate {
    id: "openrouter",
    endpoint: "https://openrouter.ai/api/v1/chat/completions",
    models_endpoint: Some("https://openrouter.ai/api/v1/models"),
    key_envs: &["OPENROUTER_API_KEY"],
    required_model_suffix: Some(":free"),
    send_stream_false: false,
    known_models: &[],
};

pub const GLM: HttpTemplate = HttpTemplate {
    id: "glm",
    endpoint: "https://open.bigmodel.cn/api/coding/paas/v4/chat/completions",
    models_endpoint: None,
    key_envs: &["ZHIPU_API_KEY", "GLM_API_KEY"],
    required_model_suffix: None,
    send_stream_false: true,
    known_models: &[
        "glm-5",
        "glm-4.7",
        "glm-4.6",
        "glm-4.5",
        "glm-4.5-air",
        "glm-4.5-x",
        "glm-4.5-airx",
        "glm-4.5-flash",
        "glm-4-32b-0414-128k",
    ],
};

pub const HTTP_TEMPLATES: &[HttpTemplate] = &[OPENROUTER, GLM];
