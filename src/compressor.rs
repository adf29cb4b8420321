//! # External Compressor Module
//!
//! Questo modulo invoca pngquant come processo esterno sincrono.
//!
//! ## Architettura
//!
//! Nessuna compressione avviene in memoria: ogni richiesta lancia esattamente
//! un processo pngquant, ne attende l'uscita e controlla l'output. La chiamata
//! è bloccante e va eseguita su un worker (`spawn_blocking`), mai sul task di
//! coordinamento della pipeline.
//!
//! ## Mappatura argomenti
//!
//! | Parametro        | Argomento pngquant                     |
//! |------------------|----------------------------------------|
//! | quality          | `--quality=<q>-<min(q+5, 100)>`        |
//! | color_count      | `--colors=<n>`                         |
//! | dither_strength  | `--floyd=<d>` (una cifra decimale)     |
//! | speed            | `--speed=<s>`                          |
//! | output           | `--output <staging path>`              |
//! | sorgente         | ultimo argomento posizionale           |
//!
//! ## Esiti
//!
//! - **Success**: exit code 0 e file di output non vuoto
//! - **LaunchFailed**: tool mancante o non eseguibile
//! - **ExitFailure**: exit code diverso da 0 (es. 98/99 di pngquant)
//! - **OutputMissing**: exit 0 ma output assente o di 0 byte
//! - **ArtifactUnavailable**: dimensioni non leggibili dopo la conversione
//!
//! Nessun retry: il fallimento viene riportato al chiamante.
//!
//! ## Staging
//!
//! pngquant scrive su un file di staging che viene rinominato sopra
//! l'artifact solo in caso di successo. Un fallimento lascia intatto il
//! preview precedente.

use crate::args;
use crate::artifact_store::TempArtifactStore;
use crate::error::ConversionFailure;
use crate::file_manager::FileManager;
use crate::model::{ConversionRequest, ConversionResult};
use crate::params::ConversionParameters;
use crate::utils::last_line;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

/// Anything able to turn a request into a result, synchronously.
///
/// Implementations are called from the blocking thread pool.
pub trait Compressor: Send + Sync + 'static {
    fn compress(&self, request: &ConversionRequest) -> ConversionResult;
}

/// Runs the pngquant executable
pub struct ExternalCompressor {
    program: PathBuf,
    store: Arc<TempArtifactStore>,
}

impl ExternalCompressor {
    pub fn new(program: impl Into<PathBuf>, store: Arc<TempArtifactStore>) -> Self {
        Self {
            program: program.into(),
            store,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for one invocation, source path last.
    pub fn build_args(parameters: &ConversionParameters, output: &Path, source: &Path) -> Vec<OsString> {
        let flags = args![
            format!("--quality={}", parameters.quality_range_arg()),
            format!("--colors={}", parameters.color_count()),
            format!("--floyd={}", parameters.dither_arg()),
            format!("--speed={}", parameters.speed()),
            "--output",
        ];

        let mut args: Vec<OsString> = flags.into_iter().map(OsString::from).collect();
        args.push(output.as_os_str().to_owned());
        args.push(source.as_os_str().to_owned());
        args
    }

    fn run(&self, request: &ConversionRequest) -> Result<ConversionResult, ConversionFailure> {
        let artifact = self.store.artifact_path(&request.source);
        let staging = self.store.staging_path(&request.source);

        // delete-then-write e promozione sotto lo stesso lock
        let lock = self.store.lock_for(&artifact);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.store
            .prepare_for_write(&staging)
            .map_err(|e| ConversionFailure::ArtifactUnavailable(e.to_string()))?;

        let args = Self::build_args(&request.parameters, &staging, request.source.path());
        debug!(
            "Generation {}: running {} {:?}",
            request.generation,
            self.program.display(),
            args
        );

        let start_time = Instant::now();
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ConversionFailure::LaunchFailed {
                program: self.program.clone(),
                message: e.to_string(),
            })?;
        let elapsed = start_time.elapsed();

        if !output.status.success() {
            let _ = fs::remove_file(&staging);
            return Err(ConversionFailure::ExitFailure {
                code: output.status.code(),
                stderr: last_line(&output.stderr),
            });
        }

        let artifact_size = match self.store.size_of(&staging) {
            Ok(size) if size > 0 => size,
            _ => {
                let _ = fs::remove_file(&staging);
                return Err(ConversionFailure::OutputMissing(staging));
            }
        };

        self.store
            .promote(&staging, &artifact)
            .map_err(|e| ConversionFailure::ArtifactUnavailable(e.to_string()))?;

        let source_size = FileManager::file_size(request.source.path()).map_err(|e| {
            ConversionFailure::ArtifactUnavailable(format!("{}: {}", request.source.path().display(), e))
        })?;

        debug!(
            "Generation {} finished in {:?}: {} -> {} bytes",
            request.generation, elapsed, source_size, artifact_size
        );

        Ok(ConversionResult::Success {
            artifact_path: artifact,
            artifact_size_bytes: artifact_size,
            source_size_bytes: source_size,
        })
    }
}

impl Compressor for ExternalCompressor {
    fn compress(&self, request: &ConversionRequest) -> ConversionResult {
        match self.run(request) {
            Ok(result) => result,
            Err(reason) => {
                warn!("Generation {} failed for {}: {}", request.generation, request.source, reason);
                ConversionResult::failure(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_store::PurgeScope;
    use crate::model::{Generation, SourceImage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    // evita ETXTBSY quando più test scrivono ed eseguono script in parallelo
    static EXEC_LOCK: Mutex<()> = Mutex::new(());

    fn write_source(dir: &Path, name: &str, len: usize) -> SourceImage {
        let path = dir.join(name);
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.resize(len, 42);
        fs::write(&path, bytes).unwrap();
        SourceImage::open(&path).unwrap()
    }

    #[test]
    fn test_build_args_scenario() {
        let params = ConversionParameters::new(50.0, 128.0, 0.5, 7.0);
        let args = ExternalCompressor::build_args(&params, Path::new("/tmp/out.png"), Path::new("/in/src.png"));

        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--quality=50-55",
                "--colors=128",
                "--floyd=0.5",
                "--speed=7",
                "--output",
                "/tmp/out.png",
                "/in/src.png",
            ]
        );
    }

    #[test]
    fn test_missing_tool_is_launch_failure() {
        let _lock = EXEC_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let input = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let store = Arc::new(TempArtifactStore::new(scratch.path(), "_preview.png", PurgeScope::Managed).unwrap());
        let source = write_source(input.path(), "logo.png", 2048);

        let compressor = ExternalCompressor::new(input.path().join("no-such-pngquant"), store.clone());
        let request = ConversionRequest::new(source.clone(), ConversionParameters::default(), Generation(1));
        let result = compressor.compress(&request);

        assert!(matches!(
            result,
            ConversionResult::Failure {
                reason: ConversionFailure::LaunchFailed { .. }
            }
        ));
        assert!(!store.artifact_path(&source).exists());
        assert!(!store.staging_path(&source).exists());
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Stand-in for pngquant: logs its arguments next to itself and
        /// writes the first 100 bytes of the source to `--output`.
        const COPYING_TOOL: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$(dirname "$0")/args.log"
out=""
while [ $# -gt 1 ]; do
  case "$1" in
    --output) shift; out="$1" ;;
  esac
  shift
done
head -c 100 "$1" > "$out"
"#;

        fn install_tool(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("pngquant");
            fs::write(&path, body).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        struct Fixture {
            tools: TempDir,
            input: TempDir,
            _scratch: TempDir,
            store: Arc<TempArtifactStore>,
        }

        fn fixture() -> Fixture {
            let scratch = TempDir::new().unwrap();
            let store = Arc::new(TempArtifactStore::new(scratch.path(), "_preview.png", PurgeScope::Managed).unwrap());
            Fixture {
                tools: TempDir::new().unwrap(),
                input: TempDir::new().unwrap(),
                _scratch: scratch,
                store,
            }
        }

        #[test]
        fn test_successful_compression() {
            let _lock = EXEC_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let fx = fixture();
            let tool = install_tool(fx.tools.path(), COPYING_TOOL);
            let source = write_source(fx.input.path(), "banner.png", 200 * 1024);
            let compressor = ExternalCompressor::new(&tool, fx.store.clone());

            let params = ConversionParameters::new(50.0, 128.0, 0.5, 7.0);
            let result = compressor.compress(&ConversionRequest::new(source.clone(), params, Generation(1)));

            let expected_artifact = fx.store.artifact_path(&source);
            assert_eq!(
                result,
                ConversionResult::Success {
                    artifact_path: expected_artifact.clone(),
                    artifact_size_bytes: 100,
                    source_size_bytes: 200 * 1024,
                }
            );
            assert!(expected_artifact.exists());
            assert!(!fx.store.staging_path(&source).exists());

            let logged = fs::read_to_string(fx.tools.path().join("args.log")).unwrap();
            let logged: Vec<&str> = logged.lines().collect();
            assert_eq!(&logged[..5], &["--quality=50-55", "--colors=128", "--floyd=0.5", "--speed=7", "--output"]);
            assert_eq!(logged[6], source.path().to_string_lossy());
        }

        #[test]
        fn test_identical_requests_give_identical_sizes() {
            let _lock = EXEC_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let fx = fixture();
            let tool = install_tool(fx.tools.path(), COPYING_TOOL);
            let source = write_source(fx.input.path(), "icon.png", 4096);
            let compressor = ExternalCompressor::new(&tool, fx.store.clone());
            let params = ConversionParameters::default();

            let first = compressor.compress(&ConversionRequest::new(source.clone(), params, Generation(1)));
            let second = compressor.compress(&ConversionRequest::new(source, params, Generation(2)));

            assert!(first.is_success());
            assert_eq!(first, second);
        }

        #[test]
        fn test_non_zero_exit() {
            let _lock = EXEC_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let fx = fixture();
            let tool = install_tool(
                fx.tools.path(),
                "#!/bin/sh\necho 'quality too low' >&2\nexit 99\n",
            );
            let source = write_source(fx.input.path(), "photo.png", 1024);
            let compressor = ExternalCompressor::new(&tool, fx.store.clone());

            let result = compressor.compress(&ConversionRequest::new(source, ConversionParameters::default(), Generation(1)));

            assert_eq!(
                result,
                ConversionResult::failure(ConversionFailure::ExitFailure {
                    code: Some(99),
                    stderr: "quality too low".to_string(),
                })
            );
        }

        #[test]
        fn test_clean_exit_without_output() {
            let _lock = EXEC_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let fx = fixture();
            let tool = install_tool(fx.tools.path(), "#!/bin/sh\nexit 0\n");
            let source = write_source(fx.input.path(), "photo.png", 1024);
            let compressor = ExternalCompressor::new(&tool, fx.store.clone());

            let result = compressor.compress(&ConversionRequest::new(source, ConversionParameters::default(), Generation(1)));

            assert!(matches!(
                result,
                ConversionResult::Failure {
                    reason: ConversionFailure::OutputMissing(_)
                }
            ));
        }

        #[test]
        fn test_zero_byte_output_is_unusable() {
            let _lock = EXEC_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let fx = fixture();
            let tool = install_tool(
                fx.tools.path(),
                "#!/bin/sh\nwhile [ $# -gt 1 ]; do\n  if [ \"$1\" = --output ]; then shift; : > \"$1\"; fi\n  shift\ndone\n",
            );
            let source = write_source(fx.input.path(), "photo.png", 1024);
            let compressor = ExternalCompressor::new(&tool, fx.store.clone());

            let result =
                compressor.compress(&ConversionRequest::new(source.clone(), ConversionParameters::default(), Generation(1)));

            assert!(matches!(
                result,
                ConversionResult::Failure {
                    reason: ConversionFailure::OutputMissing(_)
                }
            ));
            assert!(!fx.store.staging_path(&source).exists());
        }

        #[test]
        fn test_failure_keeps_previous_preview() {
            let _lock = EXEC_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let fx = fixture();
            let source = write_source(fx.input.path(), "keep.png", 4096);

            let good = install_tool(fx.tools.path(), COPYING_TOOL);
            let compressor = ExternalCompressor::new(&good, fx.store.clone());
            let first = compressor.compress(&ConversionRequest::new(source.clone(), ConversionParameters::default(), Generation(1)));
            assert!(first.is_success());

            let broken = ExternalCompressor::new(fx.tools.path().join("missing"), fx.store.clone());
            let second = broken.compress(&ConversionRequest::new(source.clone(), ConversionParameters::default(), Generation(2)));

            assert!(!second.is_success());
            assert_eq!(fs::metadata(fx.store.artifact_path(&source)).unwrap().len(), 100);
        }
    }
}
