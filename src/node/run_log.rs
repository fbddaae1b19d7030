use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
};

use crate::{timing, PRODUCT_SHORT_NAME};

/// The append-only run log, written only by the blackboard rank.
///
/// The file is opened truncate-on-open when the blackboard is constructed
/// and closed when it is dropped. Each message lands on its own line.
#[derive(Debug)]
pub struct RunLog {
    file_name: String,
    file: Option<File>,
}

impl RunLog {
    /// Opens the log file named from `root` and the current date and time.
    ///
    /// Failure to open the file is fatal for the blackboard rank.
    pub fn create(root: &str) -> io::Result<RunLog> {
        let file_name = make_log_file_name(root);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file_name)?;
        Ok(RunLog {
            file_name,
            file: Some(file),
        })
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Writes a message to the log file, terminated by a newline.
    pub fn write(&mut self, msg: &str) {
        if let Some(file) = self.file.as_mut() {
            let outcome = writeln!(file, "{}", msg).and_then(|_| file.flush());
            if let Err(e) = outcome {
                tracing::error!("could not write to the run log {}: {}", self.file_name, e);
            }
        }
    }

    /// Closes the log file; later writes are dropped.
    pub fn close(&mut self) {
        self.file = None;
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// Builds the log file name: `<root>.<YYYY-MM-DD>.<HH-MM-SS>.txt`, with an
/// empty root replaced by the product default.
pub(crate) fn make_log_file_name(root: &str) -> String {
    let root = if root.is_empty() {
        format!("{}_Log", PRODUCT_SHORT_NAME)
    } else {
        root.to_string()
    };
    format!("{}.{}.{}.txt", root, timing::date_stamp(), timing::time_stamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_follows_the_stamped_pattern() {
        let name = make_log_file_name("scratch/run");
        assert!(name.starts_with("scratch/run."));
        assert!(name.ends_with(".txt"));
        // root + '.' + date(10) + '.' + time(8) + ".txt"
        assert_eq!(name.len(), "scratch/run".len() + 1 + 10 + 1 + 8 + 4);
    }

    #[test]
    fn empty_root_selects_the_product_default() {
        let name = make_log_file_name("");
        assert!(name.starts_with(&format!("{}_Log.", PRODUCT_SHORT_NAME)));
    }

    #[test]
    fn writes_land_on_their_own_lines() {
        let dir = tempfile::tempdir().expect("could not create a temp dir");
        let root = dir.path().join("log").to_string_lossy().into_owned();
        let mut log = RunLog::create(&root).expect("could not open the run log");
        assert!(log.is_open());
        log.write("first");
        log.write("second");
        let contents =
            std::fs::read_to_string(log.file_name()).expect("could not read the run log");
        assert_eq!(contents, "first\nsecond\n");
        log.close();
        assert!(!log.is_open());
    }
}
