//! Open command - open a file with its default application

use std::path::Path;

use tracing::info;

use crate::Result;
use crate::preview::{PreviewError, PreviewRequest};

/// Execute the open command
///
/// # Errors
/// Returns an error if the file is missing or empty, or no application could
/// be launched
pub fn execute(file: &Path) -> Result<()> {
    let request = PreviewRequest::validated(file).map_err(PreviewError::from)?;
    open::that_detached(request.path())?;
    info!(file = %request.path().display(), "opened with default application");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeekrError;
    use crate::preview::InputError;
    use crate::testing::Fixtures;

    #[test]
    fn test_missing_file_is_not_opened() {
        let fixtures = Fixtures::new();
        let result = execute(&fixtures.path().join("missing.txt"));
        assert!(matches!(
            result,
            Err(PeekrError::Preview(PreviewError::Input(
                InputError::FileNotFound(_)
            )))
        ));
    }

    #[test]
    fn test_empty_file_is_not_opened() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("empty.txt", "");
        assert!(matches!(
            execute(&file),
            Err(PeekrError::Preview(PreviewError::Input(InputError::EmptyFile(_))))
        ));
    }
}
