use log::debug;

/// Observer of every operation a connection performs.
///
/// For each call attempt the connection invokes, in order and exactly once
/// each regardless of outcome: [`reset`](OperationRecorder::reset),
/// [`stage_call`](OperationRecorder::stage_call),
/// [`stage_result`](OperationRecorder::stage_result),
/// [`record_staged`](OperationRecorder::record_staged).
pub trait OperationRecorder {
    /// Discard any state staged for a previous call.
    fn reset(&mut self);

    /// The operation name and its rendered arguments, before any network
    /// interaction.
    fn stage_call(&mut self, method: &'static str, args: &[(&'static str, String)]);

    /// The rendered return value, or the error, after the call finished.
    fn stage_result(&mut self, result: Option<&str>, error: Option<&str>);

    /// Commit the staged call.
    fn record_staged(&mut self);
}

/// A recorder that writes each staged call to the `log` facade at debug
/// level.
#[derive(Debug, Default)]
pub struct LogRecorder {
    staged: Option<String>,
}

impl LogRecorder {
    pub fn new() -> Self {
        LogRecorder::default()
    }
}

impl OperationRecorder for LogRecorder {
    fn reset(&mut self) {
        self.staged = None;
    }

    fn stage_call(&mut self, method: &'static str, args: &[(&'static str, String)]) {
        let rendered: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
        self.staged = Some(format!("{method}({})", rendered.join(", ")));
    }

    fn stage_result(&mut self, result: Option<&str>, error: Option<&str>) {
        if let Some(call) = self.staged.as_mut() {
            match (result, error) {
                (_, Some(err)) => call.push_str(&format!(" -> error: {err}")),
                (Some(ret), None) => call.push_str(&format!(" -> {ret}")),
                (None, None) => call.push_str(" -> (void)"),
            }
        }
    }

    fn record_staged(&mut self) {
        if let Some(call) = self.staged.take() {
            debug!("operation: {call}");
        }
    }
}
