use evoworks::core::dialogs::{
    DialogError, FileChooser, FileMode, FileRequest, NoticeKind, Notifier,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Dialogs on the terminal: prompts on stderr, answers from a line reader.
///
/// An empty answer cancels the request.
pub struct TerminalDialogs {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl TerminalDialogs {
    pub fn new() -> Self {
        Self::with_io(io::BufReader::new(io::stdin()), io::stderr())
    }

    pub fn with_io(
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        Self {
            input: Mutex::new(Box::new(input)),
            output: Mutex::new(Box::new(output)),
        }
    }

    fn prompt(request: &FileRequest) -> String {
        let verb = match request.mode {
            FileMode::Open => "open",
            FileMode::Save => "save",
        };
        if request.extensions.is_empty() {
            format!("{} (file to {}, empty to cancel): ", request.title, verb)
        } else {
            format!(
                "{} (*.{} to {}, empty to cancel): ",
                request.title,
                request.extensions.join(", *."),
                verb
            )
        }
    }
}

impl FileChooser for TerminalDialogs {
    fn choose_file(&self, request: &FileRequest) -> Result<Option<PathBuf>, DialogError> {
        {
            let mut output = self.output.lock().map_err(|e| DialogError(e.to_string()))?;
            write!(output, "{}", Self::prompt(request)).map_err(|e| DialogError(e.to_string()))?;
            output.flush().map_err(|e| DialogError(e.to_string()))?;
        }

        let mut line = String::new();
        self.input
            .lock()
            .map_err(|e| DialogError(e.to_string()))?
            .read_line(&mut line)
            .map_err(|e| DialogError(e.to_string()))?;

        let answer = line.trim();
        if answer.is_empty() {
            return Ok(None);
        }

        let mut path = PathBuf::from(answer);
        if request.mode == FileMode::Save && path.extension().is_none() {
            if let Some(extension) = request.extensions.first() {
                path.set_extension(extension);
            }
        }
        Ok(Some(path))
    }
}

impl Notifier for TerminalDialogs {
    fn notify(&self, message: &str, kind: NoticeKind) {
        let symbol = match kind {
            NoticeKind::Info => "ℹ️ ",
            NoticeKind::Warning => "⚠️ ",
            NoticeKind::Error => "❌",
        };
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{} {}: {}", symbol, kind, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn answers_are_read_line_by_line() {
        let buffer = SharedBuffer::default();
        let dialogs = TerminalDialogs::with_io(Cursor::new("layout.xls\n\n"), buffer.clone());

        let request = FileRequest::open("Select layout spreadsheet", &["xls", "csv"]);
        assert_eq!(
            dialogs.choose_file(&request).unwrap(),
            Some(PathBuf::from("layout.xls"))
        );
        assert_eq!(dialogs.choose_file(&request).unwrap(), None);
        assert!(buffer.text().contains("*.xls, *.csv"));
    }

    #[test]
    fn save_answers_gain_the_default_extension() {
        let dialogs = TerminalDialogs::with_io(Cursor::new("run1\nrun2.txt\n"), io::sink());
        let request = FileRequest::save("Save worklist as", &["gwl"]);
        assert_eq!(
            dialogs.choose_file(&request).unwrap(),
            Some(PathBuf::from("run1.gwl"))
        );
        assert_eq!(
            dialogs.choose_file(&request).unwrap(),
            Some(PathBuf::from("run2.txt"))
        );
    }

    #[test]
    fn end_of_input_cancels() {
        let dialogs = TerminalDialogs::with_io(Cursor::new(""), io::sink());
        let request = FileRequest::open("Select layout spreadsheet", &[]);
        assert_eq!(dialogs.choose_file(&request).unwrap(), None);
    }

    #[test]
    fn notices_name_their_kind() {
        let buffer = SharedBuffer::default();
        let dialogs = TerminalDialogs::with_io(Cursor::new(""), buffer.clone());
        dialogs.notify("Reaction 'R1' overfilled by 5", NoticeKind::Warning);
        assert!(buffer.text().contains("warning: Reaction 'R1' overfilled by 5"));
    }
}
