use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use super::editor::{EditEvent, KeyDecoder, LineEditor};
use super::eval::Evaluator;
use super::highlight::{highlight_line, paint_error, paint_value};
use super::namespace::Namespace;
use super::syntax::parse;
use super::{EvalError, ReplError};
use crate::terminal::{AppSession, Application, ConsoleOutput, InputReader, Size};

pub const PROMPT: &str = ">>> ";
pub const BANNER: &str = "Connected to live console. Type help() for help.\n";

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Why a REPL run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplExit {
    /// The user asked to leave (`exit`, `quit`, Ctrl-D on an empty line).
    Quit,
    /// The session's input was closed from outside.
    InputClosed,
    /// The loop died on an output failure or a panic.
    Failed(String),
}

struct ResizeSignal(Arc<Notify>);

impl Application for ResizeSignal {
    fn on_resize(&self, _size: Size) {
        self.0.notify_one();
    }
}

enum LineOutcome {
    Continue,
    Quit,
}

/// Drives one interactive loop until the user quits or the input closes.
pub async fn run_repl(
    mut namespace: Namespace,
    mut input: InputReader,
    output: Arc<ConsoleOutput>,
    app_session: Arc<AppSession>,
) -> Result<ReplExit, ReplError> {
    let resized = Arc::new(Notify::new());
    let _binding = app_session.bind(Arc::new(ResizeSignal(Arc::clone(&resized))));

    let color = output.is_tty();
    let mut decoder = KeyDecoder::new();
    let mut editor = LineEditor::new(PROMPT);

    output.write(BANNER)?;
    output.write(&editor.render(output.get_size(), color))?;

    loop {
        tokio::select! {
            chunk = input.recv() => {
                let Some(data) = chunk else {
                    output.write("\n")?;
                    return Ok(ReplExit::InputClosed);
                };
                for key in decoder.decode(&data) {
                    match editor.handle_key(key) {
                        EditEvent::Nothing | EditEvent::Redraw => {}
                        EditEvent::Submit(line) => {
                            output.write(&format!(
                                "\r\x1b[K{}{}\n",
                                PROMPT,
                                highlight_line(&line, color)
                            ))?;
                            if let LineOutcome::Quit =
                                execute_line(&line, &mut namespace, &output, color)?
                            {
                                return Ok(ReplExit::Quit);
                            }
                        }
                        EditEvent::Interrupt => output.write("^C\n")?,
                        EditEvent::EndOfInput => {
                            output.write("\n")?;
                            return Ok(ReplExit::Quit);
                        }
                        EditEvent::ClearScreen => output.write(CLEAR_SCREEN)?,
                    }
                }
                output.write(&editor.render(output.get_size(), color))?;
            }
            _ = resized.notified() => {
                debug!(size = ?output.get_size(), "Redrawing after resize");
                output.write(&editor.render(output.get_size(), color))?;
            }
        }
    }
}

fn execute_line(
    line: &str,
    namespace: &mut Namespace,
    output: &ConsoleOutput,
    color: bool,
) -> Result<LineOutcome, ReplError> {
    let trimmed = line.trim();
    match trimmed {
        "" => return Ok(LineOutcome::Continue),
        "exit" | "quit" | "exit()" | "quit()" => return Ok(LineOutcome::Quit),
        _ => {}
    }
    if trimmed.starts_with('!') {
        output.write(&format!(
            "{}\n",
            paint_error("shell commands are not available in this console", color)
        ))?;
        return Ok(LineOutcome::Continue);
    }

    let result = parse(trimmed)
        .and_then(|statement| Evaluator::new(namespace, output).with_color(color).execute(&statement));
    match result {
        Ok(Some(value)) => output.write(&format!("{}\n", paint_value(&value, color)))?,
        Ok(None) => {}
        Err(EvalError::Output(err)) => return Err(err.into()),
        Err(err) => output.write(&format!("{}\n", paint_error(&err.to_string(), color)))?,
    }
    Ok(LineOutcome::Continue)
}

/// Runs [`run_repl`] so that neither an error nor a panic escapes. Failures
/// are logged and, where the terminal still works, shown to the user.
pub async fn run_isolated(
    namespace: Namespace,
    input: InputReader,
    output: Arc<ConsoleOutput>,
    app_session: Arc<AppSession>,
) -> ReplExit {
    let run = run_repl(namespace, input, Arc::clone(&output), app_session);
    let reason = match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(exit)) => {
            info!(exit = ?exit, "Console REPL finished");
            return exit;
        }
        Ok(Err(err)) => {
            error!(error = %err, "Console REPL failed");
            err.to_string()
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(panic = %message, "Console REPL panicked");
            format!("internal error: {}", message)
        }
    };

    let report = format!("\n{}\n", paint_error(&reason, output.is_tty()));
    if let Err(err) = output.write(&report) {
        debug!(error = %err, "Could not report REPL failure to terminal");
    }
    ReplExit::Failed(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WriteError;
    use crate::repl::highlight::strip_ansi;
    use crate::repl::namespace::HostHandle;
    use crate::session::SessionRegistry;
    use crate::terminal::{NewlineMode, PipeInput, TerminalWriter, create_pipe_input};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    #[derive(Default)]
    struct Capture {
        text: Mutex<String>,
        fail: bool,
    }

    impl TerminalWriter for Capture {
        fn write(&self, text: &str) -> Result<(), WriteError> {
            if self.fail {
                return Err(WriteError::Disconnected);
            }
            if text.contains("PANIC") {
                panic!("writer exploded");
            }
            self.text.lock().unwrap().push_str(text);
            Ok(())
        }
    }

    impl Capture {
        fn visible(&self) -> String {
            strip_ansi(&self.text.lock().unwrap())
        }
    }

    struct Running {
        input: PipeInput,
        capture: Arc<Capture>,
        app_session: Arc<AppSession>,
        output: Arc<ConsoleOutput>,
        task: JoinHandle<ReplExit>,
    }

    fn start(capture: Capture) -> Running {
        let capture = Arc::new(capture);
        let (input, reader) = create_pipe_input();
        let output = Arc::new(ConsoleOutput::new(capture.clone(), NewlineMode::Verbatim));
        let app_session = AppSession::new();
        let host = HostHandle::new("test", Arc::new(SessionRegistry::new()));
        let task = tokio::spawn(run_isolated(
            Namespace::new(host),
            reader,
            Arc::clone(&output),
            Arc::clone(&app_session),
        ));
        Running {
            input,
            capture,
            app_session,
            output,
            task,
        }
    }

    async fn finish(task: JoinHandle<ReplExit>) -> ReplExit {
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("repl did not finish")
            .expect("repl task panicked")
    }

    #[tokio::test]
    async fn test_evaluates_and_echoes() {
        let run = start(Capture::default());
        run.input.send_text("1+1\n").unwrap();
        run.input.send_text("x = 'hi'\r\nx * 2\r").unwrap();
        run.input.close().unwrap();
        assert_eq!(finish(run.task).await, ReplExit::InputClosed);

        let text = run.capture.visible();
        assert!(text.starts_with(BANNER));
        assert!(text.contains("\n2\n"));
        assert!(text.contains("'hihi'"));
    }

    #[tokio::test]
    async fn test_errors_do_not_end_the_loop() {
        let run = start(Capture::default());
        run.input.send_text("1/0\n").unwrap();
        run.input.send_text("6*7\n").unwrap();
        run.input.close().unwrap();
        assert_eq!(finish(run.task).await, ReplExit::InputClosed);

        let text = run.capture.visible();
        assert!(text.contains("error: division by zero"));
        assert!(text.contains("42"));
    }

    #[tokio::test]
    async fn test_quit_commands() {
        let run = start(Capture::default());
        run.input.send_text("exit\n").unwrap();
        assert_eq!(finish(run.task).await, ReplExit::Quit);

        let run = start(Capture::default());
        run.input.send_text("\x04").unwrap();
        assert_eq!(finish(run.task).await, ReplExit::Quit);
    }

    #[tokio::test]
    async fn test_shell_escape_is_refused() {
        let run = start(Capture::default());
        run.input.send_text("!ls\n").unwrap();
        run.input.close().unwrap();
        finish(run.task).await;
        assert!(run.capture.visible().contains("shell commands are not available"));
    }

    #[tokio::test]
    async fn test_output_failure_is_contained() {
        let run = start(Capture {
            fail: true,
            ..Capture::default()
        });
        let exit = finish(run.task).await;
        assert!(matches!(exit, ReplExit::Failed(ref reason) if reason.contains("disconnected")));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let run = start(Capture::default());
        run.input.send_text("print('PANIC')\n").unwrap();
        let exit = finish(run.task).await;
        assert!(matches!(exit, ReplExit::Failed(ref reason) if reason.contains("writer exploded")));
        assert!(run.capture.visible().contains("error: internal error"));
    }

    #[tokio::test]
    async fn test_binds_for_resize_while_running() {
        let run = start(Capture::default());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let app = run.app_session.app().expect("repl bound to session");
        run.output.set_size(Size::new(40, 10));
        app.on_resize(Size::new(40, 10));
        run.input.close().unwrap();
        finish(run.task).await;
        assert!(run.app_session.app().is_none());
    }
}
