//! Pipeline-wide execution hints consumed when the row source is constructed

use derive_builder::Builder;

/// Read-only options resolved from the pipeline's arguments
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
#[builder(default)]
pub struct ExecutionHints {
    /// Name of the engine the pipeline will run under (e.g. `DataflowRunner`)
    #[builder(setter(into))]
    pub runtime_name: String,
    /// Project the read is billed to
    #[builder(setter(into, strip_option))]
    pub project_id: Option<String>,
    /// Use the bulk read strategy regardless of runtime
    pub force_legacy: bool,
}

impl ExecutionHints {
    /// Resolve hints from engine-style arguments such as `--runner=DataflowRunner` or
    /// `--project my-project`. Flags this crate does not use are ignored.
    pub fn from_pipeline_args<S: AsRef<str>>(args: &[S]) -> Self {
        let mut hints = Self::default();
        let mut iter = args.iter().map(AsRef::as_ref).peekable();

        while let Some(arg) = iter.next() {
            let Some(flag) = arg.strip_prefix("--") else {
                continue;
            };

            let (name, value) = match flag.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => {
                    let value = iter
                        .next_if(|next| !next.starts_with("--"))
                        .map(str::to_string);
                    (flag, value)
                }
            };

            match (name, value) {
                ("runner", Some(value)) => hints.runtime_name = value,
                ("project", Some(value)) if !value.is_empty() => hints.project_id = Some(value),
                _ => {}
            }
        }

        hints
    }
}
