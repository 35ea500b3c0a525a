//! Sandbox executor — creates fresh V8 isolates and runs request scripts.
//!
//! Each run gets a brand new runtime. No state leaks between calls.
//!
//! V8 isolates are `!Send`, so all JsRuntime operations run on a dedicated
//! thread with its own single-threaded tokio runtime. The public API is
//! fully async and `Send`-safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use sandpiper_data::{
    cookies_from_headers, Environments, PreRequestResult, RequestData, ResponseData,
    TestDescriptor, TestResult,
};
use tokio::sync::Semaphore;

use crate::env_store::EnvStore;
use crate::error::SandboxError;
use crate::expect::ExpectEngine;
use crate::marshal::{self, NULL_MARKER, UNDEFINED_MARKER};
use crate::ops::{sandpiper_ext, ScriptFailure, ScriptState};
use crate::test_tree::TestStack;
use crate::validator::validate_code;

/// The namespace bootstrap, executed before every user script.
const BOOTSTRAP_JS: &str = include_str!("bootstrap/namespaces.js");

/// Watchdog poll interval for the cancel flag.
const WATCHDOG_TICK: Duration = Duration::from_millis(10);

/// Configuration for the sandbox executor.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum execution time before the run is terminated.
    pub timeout: Duration,
    /// Maximum script size in bytes.
    pub max_code_size: usize,
    /// V8 heap limit in bytes.
    pub max_heap_size: usize,
    /// Maximum concurrent sandbox executions.
    pub max_concurrent: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_code_size: 64 * 1024,        // 64 KB
            max_heap_size: 64 * 1024 * 1024, // 64 MB
            max_concurrent: 8,
        }
    }
}

/// Cooperative cancellation for an in-flight run.
///
/// `cancel()` is safe from any thread; the run's watchdog notices on its
/// next tick, terminates V8 execution, and the run returns
/// [`SandboxError::Aborted`] with no finalization.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// A fresh, uncancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination of the associated run.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Which script slot a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    PreRequest,
    PostRequest,
}

impl RunMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::PreRequest => "pre",
            Self::PostRequest => "post",
        }
    }
}

/// Everything a single run needs, moved onto the V8 thread.
struct RunInput {
    mode: RunMode,
    code: String,
    envs: Environments,
    request: RequestData,
    response: Option<ResponseData>,
}

/// Raw harvest from a completed run.
struct RunOutcome {
    envs: Environments,
    tests: Vec<TestDescriptor>,
    request: RequestData,
}

/// The sandbox executor. Creates fresh V8 isolates for each run.
///
/// This is `Send + Sync` safe — all V8 operations are dispatched to a
/// dedicated thread internally. A concurrency semaphore limits the number
/// of simultaneous V8 isolates.
pub struct SandboxExecutor {
    config: SandboxConfig,
    semaphore: Arc<Semaphore>,
}

impl SandboxExecutor {
    /// Create a new sandbox executor with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, semaphore }
    }

    /// Run a pre-request script against an environment snapshot and a
    /// mutable request.
    pub async fn run_pre_request(
        &self,
        code: &str,
        envs: Environments,
        request: RequestData,
    ) -> Result<PreRequestResult, SandboxError> {
        self.run_pre_request_with_cancel(code, envs, request, CancelHandle::new())
            .await
    }

    /// Pre-request run with external cancellation.
    pub async fn run_pre_request_with_cancel(
        &self,
        code: &str,
        envs: Environments,
        request: RequestData,
        cancel: CancelHandle,
    ) -> Result<PreRequestResult, SandboxError> {
        let input = RunInput {
            mode: RunMode::PreRequest,
            code: code.to_string(),
            envs,
            request,
            response: None,
        };
        let outcome = self.dispatch(input, cancel).await?;
        Ok(PreRequestResult {
            updated_envs: outcome.envs,
            updated_request: outcome.request,
        })
    }

    /// Run a post-request script against an environment snapshot, the
    /// request that was sent, and the response that came back.
    pub async fn run_post_request(
        &self,
        code: &str,
        envs: Environments,
        request: RequestData,
        response: ResponseData,
    ) -> Result<TestResult, SandboxError> {
        self.run_post_request_with_cancel(code, envs, request, response, CancelHandle::new())
            .await
    }

    /// Post-request run with external cancellation.
    pub async fn run_post_request_with_cancel(
        &self,
        code: &str,
        envs: Environments,
        request: RequestData,
        response: ResponseData,
        cancel: CancelHandle,
    ) -> Result<TestResult, SandboxError> {
        let input = RunInput {
            mode: RunMode::PostRequest,
            code: code.to_string(),
            envs,
            request,
            response: Some(response),
        };
        let outcome = self.dispatch(input, cancel).await?;
        Ok(TestResult {
            envs: outcome.envs,
            tests: outcome.tests,
        })
    }

    /// Validate, acquire a concurrency slot, and hand the run to a
    /// dedicated V8 thread.
    async fn dispatch(
        &self,
        input: RunInput,
        cancel: CancelHandle,
    ) -> Result<RunOutcome, SandboxError> {
        tracing::info!(
            mode = input.mode.as_str(),
            code_len = input.code.len(),
            "sandbox run: starting"
        );

        validate_code(&input.code, Some(self.config.max_code_size))?;

        let _permit = self.semaphore.clone().try_acquire_owned().map_err(|_| {
            SandboxError::ConcurrencyLimit {
                max: self.config.max_concurrent,
            }
        })?;

        let config = self.config.clone();

        // V8 isolates are !Send — run everything on a dedicated thread
        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    if tx.send(Err(SandboxError::Execution(e.into()))).is_err() {
                        tracing::warn!("sandbox result receiver dropped");
                    }
                    return;
                }
            };
            let result = rt.block_on(run_script(&config, input, cancel));
            if tx.send(result).is_err() {
                tracing::warn!("sandbox result receiver dropped before result was sent");
            }
        });

        let result = rx
            .await
            .map_err(|_| SandboxError::Execution(anyhow::anyhow!("sandbox thread panicked")))?;

        match &result {
            Ok(_) => tracing::info!("sandbox run: complete"),
            Err(e) => tracing::warn!(error = %e, "sandbox run: failed"),
        }

        result
    }
}

/// State for the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    /// Whether the heap limit has been triggered. AtomicBool so the callback
    /// can use a shared `&` reference instead of `&mut`.
    triggered: AtomicBool,
}

/// V8 near-heap-limit callback. Terminates execution and grants 1MB grace
/// for the termination to propagate cleanly.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points to the Box<HeapLimitState> allocated in
    // run_script. The Box outlives this callback: the watchdog thread is
    // joined before heap_state drops, and V8 only invokes the callback
    // while the event loop runs, which completes before the join.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// Create a fresh JsRuntime with the sandpiper extension loaded, heap
/// limits set, and the run's script state installed.
fn create_runtime(
    config: &SandboxConfig,
    envs: Environments,
    request: RequestData,
) -> JsRuntime {
    let create_params = v8::CreateParams::default().heap_limits(0, config.max_heap_size);

    let runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![sandpiper_ext::init()],
        create_params: Some(create_params),
        ..Default::default()
    });

    runtime.op_state().borrow_mut().put(ScriptState {
        env: EnvStore::new(envs),
        tests: TestStack::new(),
        expect: ExpectEngine::default(),
        request,
    });

    runtime
}

/// Run one script on the current thread (must be called from a dedicated
/// thread, not the main tokio runtime).
async fn run_script(
    config: &SandboxConfig,
    input: RunInput,
    cancel: CancelHandle,
) -> Result<RunOutcome, SandboxError> {
    let mut runtime = create_runtime(config, input.envs, input.request.clone());

    // --- Inject run parameters and build the namespaces ---
    let response_value = match &input.response {
        Some(response) => {
            let cookies: Vec<_> = cookies_from_headers(response)
                .into_iter()
                .map(|c| serde_json::json!({ "name": c.name, "value": c.value }))
                .collect();
            let mut value = serde_json::to_value(response)?;
            value["cookies"] = serde_json::Value::Array(cookies);
            value
        }
        None => serde_json::Value::Null,
    };
    let init = serde_json::json!({
        "mode": input.mode.as_str(),
        "undefinedMarker": UNDEFINED_MARKER,
        "nullMarker": NULL_MARKER,
        "request": input.request,
        "response": response_value,
    });

    runtime
        .execute_script("[sandpiper:init]", format!("globalThis.__sp_init = {init};"))
        .map_err(|e| SandboxError::Execution(anyhow::anyhow!("init injection failed: {e}")))?;

    runtime
        .execute_script("[sandpiper:bootstrap]", BOOTSTRAP_JS)
        .map_err(|e| SandboxError::Execution(anyhow::anyhow!("bootstrap failed: {e}")))?;

    // --- Compile the user script ---
    // Wrapping in an async arrow gives top-level await and makes a syntax
    // error surface here, before anything runs.
    let compile = format!(
        "globalThis.__sp_user = (async () => {{\n{}\n}});",
        input.code
    );
    if let Err(e) = runtime.execute_script("[sandpiper:compile]", compile) {
        return Err(SandboxError::CompileError {
            message: e.to_string(),
        });
    }

    // --- Set up heap limit callback ---
    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        &*heap_state as *const HeapLimitState as *mut std::ffi::c_void,
    );

    // --- Set up CPU watchdog ---
    // Ticks every few milliseconds so an external cancel is honored
    // promptly even while V8 is stuck in a tight loop.
    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let aborted = Arc::new(AtomicBool::new(false));
    let watchdog_timed_out = timed_out.clone();
    let watchdog_aborted = aborted.clone();
    let watchdog_cancel = cancel.clone();
    let timeout = config.timeout;
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

    let watchdog = std::thread::spawn(move || {
        let deadline = Instant::now() + timeout;
        loop {
            match stop_rx.recv_timeout(WATCHDOG_TICK) {
                Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            }
            if watchdog_cancel.is_cancelled() {
                watchdog_aborted.store(true, Ordering::SeqCst);
                watchdog_handle.terminate_execution();
                return;
            }
            if Instant::now() >= deadline {
                watchdog_timed_out.store(true, Ordering::SeqCst);
                watchdog_handle.terminate_execution();
                return;
            }
        }
    });

    // --- Execute the user script ---
    let runner = r#"
        (async () => {
            try {
                await globalThis.__sp_user();
            } catch (e) {
                __sp_report(e);
            }
        })();
    "#;

    let exec_error = match runtime.execute_script("[sandpiper:run]", runner) {
        Ok(_) => {
            match tokio::time::timeout(
                config.timeout,
                runtime.run_event_loop(PollEventLoopOptions::default()),
            )
            .await
            {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("async timeout".to_string()),
            }
        }
        Err(e) => Some(e.to_string()),
    };

    // --- Cleanup: stop the watchdog before dropping the runtime ---
    let _ = stop_tx.send(());
    let _ = watchdog.join();

    // --- Check error causes in priority order ---
    if heap_state.triggered.load(Ordering::SeqCst) {
        return Err(SandboxError::HeapLimitExceeded);
    }

    if aborted.load(Ordering::SeqCst) {
        return Err(SandboxError::Aborted);
    }

    if timed_out.load(Ordering::SeqCst) {
        return Err(SandboxError::Timeout {
            timeout_ms: config.timeout.as_millis() as u64,
        });
    }

    // --- Harvest state ---
    let state = runtime
        .op_state()
        .borrow_mut()
        .try_take::<ScriptState>()
        .ok_or_else(|| SandboxError::Execution(anyhow::anyhow!("script state missing")))?;

    let failure = runtime.op_state().borrow_mut().try_take::<ScriptFailure>();

    if let Some(err_msg) = exec_error {
        return Err(SandboxError::JsError { message: err_msg });
    }
    if let Some(ScriptFailure(message)) = failure {
        return Err(SandboxError::JsError { message });
    }

    let mut envs = state.env.into_envs();
    marshal::finalize_envs(&mut envs);

    Ok(RunOutcome {
        envs,
        tests: state.tests.finish(),
        request: state.request,
    })
}
