//! Single-pass, non-recursive `${{ #include PATH }}` expansion.
//!
//! Uses the same "scan with `find_subsequence`" approach `reader.rs` uses to
//! find the header terminator, rather than pulling in a templating crate for
//! something this small.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::bytes_util::find_subsequence;
use crate::error::{HttpError, ServerError};
use crate::log::Logger;

/// Expands every `startDelim #include PATH endDelim` directive in `input`
/// against files under `root`. An unterminated start delimiter is logged
/// and the remainder of `input` is emitted verbatim (not an error). Any
/// other malformed or unrecognized directive, or a missing included file,
/// is a server failure.
pub async fn expand(input: &[u8], root: &Path, start_delim: &str, end_delim: &str, logger: &Logger) -> Result<Vec<u8>, HttpError> {
    let start_bytes = start_delim.as_bytes();
    let end_bytes = end_delim.as_bytes();

    let mut out = Vec::with_capacity(input.len());
    let mut cursor = 0usize;

    while let Some(rel_start) = find_subsequence(&input[cursor..], start_bytes) {
        let directive_start = cursor + rel_start;
        out.extend_from_slice(&input[cursor..directive_start]);

        let body_start = directive_start + start_bytes.len();
        match find_subsequence(&input[body_start..], end_bytes) {
            None => {
                logger.error(format!("unterminated template delimiter at byte {}", directive_start), None);
                out.extend_from_slice(&input[directive_start..]);
                cursor = input.len();
                break;
            }
            Some(rel_end) => {
                let body_end = body_start + rel_end;
                let directive_text = std::str::from_utf8(&input[body_start..body_end])
                    .map_err(|_| ServerError::new("template directive is not valid UTF-8", file!(), line!(), "expand"))?
                    .trim();

                let tokens: Vec<&str> = directive_text.split_whitespace().collect();
                if tokens.len() != 2 || tokens[0] != "#include" {
                    return Err(ServerError::new(format!("unrecognized template directive: {:?}", directive_text), file!(), line!(), "expand").into());
                }

                let included_path = root.join(tokens[1]);
                let mut file = tokio::fs::File::open(&included_path)
                    .await
                    .map_err(|_| ServerError::new(format!("included file not found: {}", tokens[1]), file!(), line!(), "expand"))?;
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes).await.map_err(HttpError::from)?;
                out.extend_from_slice(&bytes);

                cursor = body_end + end_bytes.len();
            }
        }
    }

    out.extend_from_slice(&input[cursor..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_with_no_delimiter_round_trips() {
        let input = b"plain bytes, no directives here";
        let root = std::path::PathBuf::from("/nonexistent");
        let logger = Logger::new(10);
        let result = tokio_test_block_on(expand(input, &root, "${{", "}}", &logger));
        assert_eq!(result.unwrap(), input.to_vec());
    }

    #[test]
    fn unrecognized_directive_is_a_server_error() {
        let input = b"before ${{ #nope foo.txt }} after";
        let root = std::path::PathBuf::from("/nonexistent");
        let logger = Logger::new(10);
        let result = tokio_test_block_on(expand(input, &root, "${{", "}}", &logger));
        assert!(result.is_err());
    }

    /// A tiny single-threaded block_on, since pulling in `tokio::test` for a
    /// handful of pure-function tests would be the only reason this test
    /// module needs the `rt` feature.
    fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(fut)
    }
}
