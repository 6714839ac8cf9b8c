use clap::{Args, Parser, Subcommand, ValueEnum};
use genai::adapter::AdapterKind;
use std::path::PathBuf;

/// Tool orchestration for repository analysis
#[derive(Parser, Debug)]
#[command(
    name = "reposcope",
    about = "Tool orchestration for repository analysis",
    version,
    author,
    long_about = "reposcope turns a natural-language request about a repository into a run of \
                  analysis tools. Static mode plans batches from the request's intent; agentic \
                  mode lets a model pick tools turn by turn. Supports Ollama, OpenAI, Claude, \
                  Gemini, Grok and Groq."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Increase verbosity (can be used multiple times)"
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Plan and run analysis tools for a request",
        long_about = "Derives the intent of the request, selects matching tools, groups them \
                      into batches by expected latency and runs them.\n\n\
                      Examples:\n  \
                      reposcope analyze . \"explore this repository\"\n  \
                      reposcope analyze https://github.com/owner/repo \"scan for vulnerabilities\"\n  \
                      reposcope analyze . \"code quality review\" --no-model --format json"
    )]
    Analyze(AnalyzeArgs),

    #[command(
        about = "Let a model drive the analysis turn by turn",
        long_about = "Offers every healthy tool to the model and runs the tool calls it makes \
                      until it reports completion or a turn limit is reached.\n\n\
                      Examples:\n  \
                      reposcope agent https://github.com/owner/repo \"audit the dependencies\"\n  \
                      reposcope agent . \"find performance problems\" --max-turns 10"
    )]
    Agent(AgentArgs),

    #[command(
        about = "Check a tool pipeline for cycles and logical order",
        long_about = "Reads a workflow graph (JSON or YAML with `nodes` and `edges`) and \
                      checks its structure, rejects cycles and asks the model whether the \
                      steps are in a coherent order.\n\n\
                      Examples:\n  \
                      reposcope validate-workflow pipeline.yaml"
    )]
    ValidateWorkflow(ValidateWorkflowArgs),

    #[command(about = "List registered tools with their capabilities and health")]
    Tools(ToolsArgs),

    #[command(
        about = "Check backend availability",
        long_about = "Checks the configured model backend and the health of every tool.\n\n\
                      Examples:\n  \
                      reposcope health\n  \
                      reposcope health --provider ollama"
    )]
    Health(HealthArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    #[arg(
        short = 'p',
        long,
        value_parser = parse_adapter_kind,
        help = "Force a specific model provider (by default, the best available is auto-selected)"
    )]
    pub provider: Option<AdapterKind>,

    #[arg(
        short = 'm',
        long,
        value_name = "MODEL",
        help = "Model name to use (provider-specific, e.g., 'qwen2.5-coder:7b' for Ollama)"
    )]
    pub model: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "Model request timeout in seconds")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(value_name = "REPOSITORY", help = "Local path or remote git URL")]
    pub repository: String,

    #[arg(
        value_name = "REQUEST",
        default_value = "explore the repository",
        help = "What to analyze, in plain language"
    )]
    pub request: String,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    #[arg(long, help = "Skip the model and classify the request as exploration")]
    pub no_model: bool,

    #[arg(long, value_name = "N", help = "Fast tools per parallel batch")]
    pub max_parallel: Option<usize>,

    #[arg(long, value_name = "SECONDS", help = "Per-tool timeout in seconds")]
    pub tool_timeout: Option<u64>,

    #[arg(
        long = "param",
        value_name = "KEY=VALUE",
        value_parser = parse_param,
        help = "Extra request parameter passed to tools (repeatable)"
    )]
    pub params: Vec<(String, String)>,

    #[arg(long, help = "Do not draw a progress bar")]
    pub no_progress: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct AgentArgs {
    #[arg(value_name = "REPOSITORY", help = "Local path or remote git URL")]
    pub repository: String,

    #[arg(value_name = "REQUEST", help = "What to analyze, in plain language")]
    pub request: String,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    #[arg(long, value_name = "N", help = "Hard limit on conversation turns")]
    pub max_turns: Option<usize>,

    #[arg(
        long,
        value_name = "N",
        help = "Tools that must run before the model may finish"
    )]
    pub min_tools: Option<usize>,

    #[arg(long, value_name = "SECONDS", help = "Per-tool timeout in seconds")]
    pub tool_timeout: Option<u64>,

    #[arg(long, help = "Do not draw a progress bar")]
    pub no_progress: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateWorkflowArgs {
    #[arg(value_name = "FILE", help = "Workflow graph as JSON or YAML")]
    pub file: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ToolsArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(long, help = "Also print the effective configuration")]
    pub show_config: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_adapter_kind(s: &str) -> Result<AdapterKind, String> {
    AdapterKind::from_lower_str(&s.to_lowercase()).ok_or_else(|| {
        format!(
            "Invalid provider: {}. Valid options: ollama, openai, anthropic, gemini, xai, groq",
            s
        )
    })
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Expected KEY=VALUE, got '{}'", s)),
    }
}
