use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;
use wayfarer_core::CommandResult;

use super::WorkerError;

/// Operations the bundled worker knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    Mkdir,
    Touch,
    Rename,
    Rm,
    Realpath,
    Mimetype,
}

impl WorkerCommand {
    pub const ALL: [WorkerCommand; 6] = [
        WorkerCommand::Mkdir,
        WorkerCommand::Touch,
        WorkerCommand::Rename,
        WorkerCommand::Rm,
        WorkerCommand::Realpath,
        WorkerCommand::Mimetype,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WorkerCommand::Mkdir => "mkdir",
            WorkerCommand::Touch => "touch",
            WorkerCommand::Rename => "rename",
            WorkerCommand::Rm => "rm",
            WorkerCommand::Realpath => "realpath",
            WorkerCommand::Mimetype => "mimetype",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    pub async fn execute(self, parameters: Value) -> Result<CommandResult, WorkerError> {
        let result = match self {
            WorkerCommand::Mkdir => mkdir(parse(parameters)?).await,
            WorkerCommand::Touch => touch(parse(parameters)?).await,
            WorkerCommand::Rename => rename(parse(parameters)?).await,
            WorkerCommand::Rm => rm(parse(parameters)?).await,
            WorkerCommand::Realpath => realpath(parse(parameters)?).await,
            WorkerCommand::Mimetype => mimetype(parse(parameters)?),
        };
        Ok(normalize_strings(result))
    }
}

fn parse<T: DeserializeOwned>(parameters: Value) -> Result<T, WorkerError> {
    serde_json::from_value(parameters).map_err(WorkerError::InvalidParameters)
}

/// `finish` with `fields`, or `error` carrying the same fields.
fn outcome(fields: Map<String, Value>, result: io::Result<()>) -> CommandResult {
    let mut base = match result {
        Ok(()) => CommandResult::finish(),
        Err(err) => CommandResult::error(err.to_string()),
    };
    base.fields = fields;
    base
}

fn path_fields(pairs: &[(&str, &Path)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, path)| {
            (
                key.to_string(),
                Value::String(path.to_string_lossy().into_owned()),
            )
        })
        .collect()
}

fn normalize_strings(mut result: CommandResult) -> CommandResult {
    for value in result.fields.values_mut() {
        if let Value::String(text) = value {
            *text = text.nfc().collect();
        }
    }
    result
}

fn already_exists(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{} already exists", path.display()),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MkdirParameters {
    destination_directory_path: PathBuf,
    directory_name: String,
}

async fn mkdir(parameters: MkdirParameters) -> CommandResult {
    let path = parameters
        .destination_directory_path
        .join(&parameters.directory_name);
    let result = tokio::fs::create_dir(&path).await;
    outcome(path_fields(&[("path", path.as_path())]), result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TouchParameters {
    destination_directory_path: PathBuf,
    file_name: String,
}

async fn touch(parameters: TouchParameters) -> CommandResult {
    let path = parameters
        .destination_directory_path
        .join(&parameters.file_name);
    let result = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map(|_| ());
    outcome(path_fields(&[("path", path.as_path())]), result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameParameters {
    source_path: PathBuf,
    basename: String,
}

async fn rename(parameters: RenameParameters) -> CommandResult {
    let source = parameters.source_path;
    let parent = source.parent().unwrap_or_else(|| Path::new("/"));
    let destination = parent.join(&parameters.basename);

    let result = match tokio::fs::symlink_metadata(&destination).await {
        Ok(_) => Err(already_exists(&destination)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tokio::fs::rename(&source, &destination).await
        }
        Err(err) => Err(err),
    };
    outcome(
        path_fields(&[("oldPath", source.as_path()), ("newPath", destination.as_path())]),
        result,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RmParameters {
    source_paths: Vec<PathBuf>,
}

async fn rm(parameters: RmParameters) -> CommandResult {
    let mut result = Ok(());
    for path in &parameters.source_paths {
        if let Err(err) = remove_path(path).await {
            result = Err(err);
            break;
        }
    }
    outcome(Map::new(), result)
}

async fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealpathParameters {
    cwd: Option<PathBuf>,
    source_path: PathBuf,
}

async fn realpath(parameters: RealpathParameters) -> CommandResult {
    let cwd = parameters.cwd.unwrap_or_else(|| PathBuf::from("."));
    match tokio::fs::canonicalize(cwd.join(&parameters.source_path)).await {
        Ok(resolved) => outcome(path_fields(&[("path", resolved.as_path())]), Ok(())),
        Err(err) => outcome(path_fields(&[("path", Path::new(""))]), Err(err)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MimetypeParameters {
    source_path: PathBuf,
}

fn mimetype(parameters: MimetypeParameters) -> CommandResult {
    match mime_guess::from_path(&parameters.source_path).first() {
        Some(mime) => CommandResult::finish().with_field("mime", mime.essence_str()),
        None => CommandResult::finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use wayfarer_core::CommandStatus;

    async fn run(command: WorkerCommand, parameters: Value) -> CommandResult {
        command.execute(parameters).await.unwrap()
    }

    #[test]
    fn names_round_trip() {
        for command in WorkerCommand::ALL {
            assert_eq!(WorkerCommand::from_name(command.name()), Some(command));
        }
        assert_eq!(WorkerCommand::from_name("zip"), None);
    }

    #[tokio::test]
    async fn mkdir_creates_once() {
        let tmp = tempdir().unwrap();
        let parameters = json!({
            "destinationDirectoryPath": tmp.path(),
            "directoryName": "photos",
        });

        let created = run(WorkerCommand::Mkdir, parameters.clone()).await;
        assert_eq!(created.status, CommandStatus::Finish);
        assert_eq!(
            created.fields["path"],
            json!(tmp.path().join("photos").to_string_lossy())
        );
        assert!(tmp.path().join("photos").is_dir());

        let again = run(WorkerCommand::Mkdir, parameters).await;
        assert_eq!(again.status, CommandStatus::Error);
        assert!(again.error.is_some());
        assert!(again.fields.contains_key("path"));
    }

    #[tokio::test]
    async fn touch_refuses_to_clobber() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("keep.txt"), b"data").unwrap();

        let fresh = run(
            WorkerCommand::Touch,
            json!({"destinationDirectoryPath": tmp.path(), "fileName": "new.txt"}),
        )
        .await;
        assert_eq!(fresh.status, CommandStatus::Finish);
        assert_eq!(std::fs::metadata(tmp.path().join("new.txt")).unwrap().len(), 0);

        let existing = run(
            WorkerCommand::Touch,
            json!({"destinationDirectoryPath": tmp.path(), "fileName": "keep.txt"}),
        )
        .await;
        assert_eq!(existing.status, CommandStatus::Error);
        assert_eq!(std::fs::read(tmp.path().join("keep.txt")).unwrap(), b"data");
    }

    #[tokio::test]
    async fn rename_moves_within_the_parent() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("a.txt");
        std::fs::write(&source, b"x").unwrap();
        std::fs::write(tmp.path().join("taken.txt"), b"y").unwrap();

        let blocked = run(
            WorkerCommand::Rename,
            json!({"sourcePath": source, "basename": "taken.txt"}),
        )
        .await;
        assert_eq!(blocked.status, CommandStatus::Error);
        assert!(source.exists());

        let moved = run(
            WorkerCommand::Rename,
            json!({"sourcePath": source, "basename": "b.txt"}),
        )
        .await;
        assert_eq!(moved.status, CommandStatus::Finish);
        assert_eq!(moved.fields["oldPath"], json!(source.to_string_lossy()));
        assert_eq!(
            moved.fields["newPath"],
            json!(tmp.path().join("b.txt").to_string_lossy())
        );
        assert!(!source.exists());
        assert!(tmp.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn rm_removes_files_and_trees() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("f");
        let tree = tmp.path().join("tree");
        std::fs::write(&file, b"").unwrap();
        std::fs::create_dir_all(tree.join("nested")).unwrap();
        std::fs::write(tree.join("nested/leaf"), b"").unwrap();

        let removed = run(WorkerCommand::Rm, json!({"sourcePaths": [file, tree]})).await;
        assert_eq!(removed.status, CommandStatus::Finish);
        assert!(!file.exists());
        assert!(!tree.exists());

        let missing = run(WorkerCommand::Rm, json!({"sourcePaths": [file]})).await;
        assert_eq!(missing.status, CommandStatus::Error);
    }

    #[tokio::test]
    async fn realpath_resolves_against_cwd() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("real")).unwrap();
        let expected = std::fs::canonicalize(tmp.path().join("real")).unwrap();

        let resolved = run(
            WorkerCommand::Realpath,
            json!({"cwd": tmp.path(), "sourcePath": "real/../real"}),
        )
        .await;
        assert_eq!(resolved.status, CommandStatus::Finish);
        assert_eq!(resolved.fields["path"], json!(expected.to_string_lossy()));

        let missing = run(
            WorkerCommand::Realpath,
            json!({"cwd": tmp.path(), "sourcePath": "ghost"}),
        )
        .await;
        assert_eq!(missing.status, CommandStatus::Error);
        assert_eq!(missing.fields["path"], "");
    }

    #[tokio::test]
    async fn mimetype_guesses_from_extension() {
        let png = run(WorkerCommand::Mimetype, json!({"sourcePath": "/x/cat.png"})).await;
        assert_eq!(png.fields["mime"], "image/png");

        let unknown = run(WorkerCommand::Mimetype, json!({"sourcePath": "/x/blob"})).await;
        assert_eq!(unknown.status, CommandStatus::Finish);
        assert!(!unknown.fields.contains_key("mime"));
    }

    #[tokio::test]
    async fn bad_parameters_are_rejected() {
        let err = WorkerCommand::Mkdir.execute(json!({"directoryName": 3})).await;
        assert!(matches!(err, Err(WorkerError::InvalidParameters(_))));
    }

    #[test]
    fn result_strings_are_nfc() {
        let decomposed = "e\u{301}.txt";
        let result = normalize_strings(CommandResult::finish().with_field("path", decomposed));
        assert_eq!(result.fields["path"], "\u{e9}.txt");
    }
}
