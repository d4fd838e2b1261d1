//! Job source reading the account list.
//!
//! The input is line oriented: one job per line, six `|`-separated fields
//! in the order source host, source user, source password, target host,
//! target user, target password. The separator cannot be escaped.
//!
//! Lines are read as bytes. A line that is not valid UTF-8 is rejected on
//! its own and never stops the rest of the input from being read.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split};

use crate::error::{JobParseError, RunError};

use super::job::{Credentials, Job};

/// Field separator of the account list.
pub const FIELD_SEPARATOR: char = '|';

const FIELD_COUNT: usize = 6;

/// One non-blank line of input, either a job or the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Job { line: usize, job: Job },
    Malformed { line: usize, error: JobParseError },
}

/// Parses a single input line.
///
/// Returns `Ok(None)` for blank lines. `line` is 1-based and only used for
/// error reporting.
pub fn parse_line(line: usize, text: &str) -> Result<Option<Job>, JobParseError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(JobParseError::FieldCount {
            line,
            found: fields.len(),
        });
    }

    // Hosts and users name the job and its log file; passwords may be anything.
    let required = [
        (0, "source host"),
        (1, "source user"),
        (3, "target host"),
        (4, "target user"),
    ];
    for (index, field) in required {
        if fields[index].is_empty() {
            return Err(JobParseError::EmptyField { line, field });
        }
    }

    Ok(Some(Job::new(
        Credentials::new(fields[0], fields[1], fields[2]),
        Credentials::new(fields[3], fields[4], fields[5]),
    )))
}

/// Decodes one raw input line, dropping a trailing `\r`.
fn decode_line(line: usize, mut bytes: Vec<u8>) -> Result<String, JobParseError> {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes).map_err(|_| JobParseError::InvalidUtf8 { line })
}

/// Lazy sequence of jobs read from a line-oriented reader.
pub struct JobSource<R> {
    path: PathBuf,
    segments: Split<R>,
    line: usize,
}

impl JobSource<BufReader<File>> {
    /// Opens the account list at `path`.
    ///
    /// # Errors
    ///
    /// Returns `RunError::InputUnreadable` if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RunError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|source| RunError::InputUnreadable {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self::from_reader(path, BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin> JobSource<R> {
    /// Wraps any buffered reader. `path` is only used in error messages.
    pub fn from_reader(path: impl Into<PathBuf>, reader: R) -> Self {
        Self {
            path: path.into(),
            segments: reader.split(b'\n'),
            line: 0,
        }
    }

    /// Returns the next non-blank line, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns `RunError::InputUnreadable` if reading fails midway. Bad
    /// content is never an error here; it comes back as `Malformed`.
    pub async fn next(&mut self) -> Result<Option<ParsedLine>, RunError> {
        loop {
            let bytes = self
                .segments
                .next_segment()
                .await
                .map_err(|source| RunError::InputUnreadable {
                    path: self.path.clone(),
                    source,
                })?;

            let Some(bytes) = bytes else {
                return Ok(None);
            };
            self.line += 1;

            let parsed = decode_line(self.line, bytes)
                .and_then(|text| parse_line(self.line, &text));
            match parsed {
                Ok(Some(job)) => {
                    return Ok(Some(ParsedLine::Job {
                        line: self.line,
                        job,
                    }))
                }
                Ok(None) => continue,
                Err(error) => {
                    return Ok(Some(ParsedLine::Malformed {
                        line: self.line,
                        error,
                    }))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let job = parse_line(1, "old.example|alice|pw1|new.example|bob|pw2")
            .expect("line should parse")
            .expect("line is not blank");

        assert_eq!(job.source.host, "old.example");
        assert_eq!(job.source.user, "alice");
        assert_eq!(job.source.password, "pw1");
        assert_eq!(job.target.host, "new.example");
        assert_eq!(job.target.user, "bob");
        assert_eq!(job.target.password, "pw2");
    }

    #[test]
    fn test_parse_line_keeps_whitespace_in_passwords() {
        let job = parse_line(1, "h1|u1| pass word |h2|u2|")
            .expect("line should parse")
            .expect("line is not blank");

        assert_eq!(job.source.password, " pass word ");
        assert_eq!(job.target.password, "");
    }

    #[test]
    fn test_parse_line_blank() {
        assert_eq!(parse_line(3, ""), Ok(None));
        assert_eq!(parse_line(3, "   \t"), Ok(None));
    }

    #[test]
    fn test_parse_line_wrong_field_count() {
        assert_eq!(
            parse_line(4, "h1|u1|p1|h2|u2"),
            Err(JobParseError::FieldCount { line: 4, found: 5 })
        );
        assert_eq!(
            parse_line(5, "h1|u1|p1|h2|u2|p2|extra"),
            Err(JobParseError::FieldCount { line: 5, found: 7 })
        );
    }

    #[test]
    fn test_parse_line_empty_user() {
        assert_eq!(
            parse_line(2, "h1||p1|h2|u2|p2"),
            Err(JobParseError::EmptyField {
                line: 2,
                field: "source user"
            })
        );
    }

    #[tokio::test]
    async fn test_job_source_numbers_lines() {
        let input = "h1|a|p|h2|b|p\n\nbroken line\r\nh1|c|p|h2|d|p\r\n";
        let mut source = JobSource::from_reader("accounts.txt", input.as_bytes());

        match source.next().await.expect("read") {
            Some(ParsedLine::Job { line, job }) => {
                assert_eq!(line, 1);
                assert_eq!(job.log_identity(), "a_TO_b");
            }
            other => panic!("unexpected {:?}", other),
        }

        match source.next().await.expect("read") {
            Some(ParsedLine::Malformed { line, error }) => {
                assert_eq!(line, 3);
                assert_eq!(error, JobParseError::FieldCount { line: 3, found: 1 });
            }
            other => panic!("unexpected {:?}", other),
        }

        match source.next().await.expect("read") {
            Some(ParsedLine::Job { line, job }) => {
                assert_eq!(line, 4);
                assert_eq!(job.target.password, "p");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(source.next().await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_job_source_rejects_non_utf8_line_and_continues() {
        let input: &[u8] = b"h1|alice|pw|h2|bob|pw\nh1|carol|p\xe4ss|h2|dave|pw\r\nh1|erin|pw|h2|frank|pw";
        let mut source = JobSource::from_reader("accounts.txt", input);

        assert!(matches!(
            source.next().await.expect("read"),
            Some(ParsedLine::Job { line: 1, .. })
        ));
        assert_eq!(
            source.next().await.expect("read"),
            Some(ParsedLine::Malformed {
                line: 2,
                error: JobParseError::InvalidUtf8 { line: 2 },
            })
        );
        match source.next().await.expect("read") {
            Some(ParsedLine::Job { line, job }) => {
                assert_eq!(line, 3);
                assert_eq!(job.log_identity(), "erin_TO_frank");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(source.next().await.expect("read").is_none());
    }

    #[test]
    fn test_decode_line_strips_carriage_return() {
        assert_eq!(decode_line(1, b"a|b\r".to_vec()), Ok("a|b".to_string()));
        assert_eq!(decode_line(1, b"a\rb".to_vec()), Ok("a\rb".to_string()));
        assert_eq!(
            decode_line(9, vec![0xff]),
            Err(JobParseError::InvalidUtf8 { line: 9 })
        );
    }

    #[tokio::test]
    async fn test_job_source_open_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = JobSource::open(dir.path().join("missing.txt")).await;
        assert!(matches!(result, Err(RunError::InputUnreadable { .. })));
    }
}
