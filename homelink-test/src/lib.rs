/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Test harness for Homelink.
//!
//! Annotate an `async fn` with [`homelink_test`] to run it on its own runtime:
//!
//! ```rust,ignore
//! use homelink_test::prelude::*;
//!
//! #[homelink_test]
//! async fn broadcasts_reach_everyone() -> anyhow::Result<()> {
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::any::Any;
use std::panic;
use std::sync::{Once, OnceLock};

use parking_lot::Mutex;
use tracing::error;

pub use homelink_test_macro::homelink_test;

/// Re-exports used by the expansion of [`homelink_test`].
pub mod prelude {
    pub use homelink_test_macro::homelink_test;
}

#[doc(hidden)]
pub mod __private {
    pub use tokio;
    pub use tracing;
}

const THREAD_PREFIX: &str = "homelink-test:";

#[derive(Debug, Clone)]
struct PanicRecord {
    message: String,
    location: String,
}

fn recorded_panics() -> &'static Mutex<HashMap<String, PanicRecord>> {
    static PANICS: OnceLock<Mutex<HashMap<String, PanicRecord>>> = OnceLock::new();
    PANICS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "No error message".to_string())
        .trim()
        .replace('\n', " ")
}

fn install_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            if let Some(name) = thread.name().filter(|n| n.starts_with(THREAD_PREFIX)) {
                let record = PanicRecord {
                    message: panic_message(info.payload()),
                    location: info
                        .location()
                        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                        .unwrap_or_else(|| "unknown location".to_string()),
                };
                error!(thread = name, "Panic: {}", record.message);
                recorded_panics()
                    .lock()
                    .entry(name.to_string())
                    .or_insert(record);
            }
            previous(info);
        }));
    });
}

/// Tracks panics raised on the worker threads of one test's runtime.
#[derive(Debug)]
pub struct PanicWatch {
    thread_name: String,
}

impl PanicWatch {
    /// Starts watching for panics on behalf of the named test.
    #[must_use]
    pub fn new(test_name: &str) -> Self {
        install_hook();
        let thread_name = format!("{THREAD_PREFIX}{test_name}");
        recorded_panics().lock().remove(&thread_name);
        Self { thread_name }
    }

    /// The name given to every worker thread of the watched runtime.
    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Builds the multi-threaded runtime the test body runs on.
    pub fn runtime(&self) -> std::io::Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name(self.thread_name.clone())
            .build()
    }

    /// Re-raises the first panic recorded on the watched runtime, if any.
    ///
    /// # Panics
    ///
    /// Panics when a worker thread of the watched runtime panicked.
    pub fn finish(self) {
        if let Some(record) = recorded_panics().lock().remove(&self.thread_name) {
            panic!("Panic at {}: {}", record.location, record.message);
        }
    }
}
