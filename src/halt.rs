// src/halt.rs

//! Terminal handler for unrecoverable errors
//!
//! There is no automatic recovery anywhere in the installer. Every failure
//! ends up here: the code is shown, storage is unmounted, and the process
//! waits for the operator to acknowledge before exiting.

use crate::error::Error;
use crate::platform::Platform;
use tracing::error;

/// Instruction shown under the error code
pub const ACKNOWLEDGE_PROMPT: &str = "Press the HOME button to return to the launcher";

/// Print the error and unmount all storage
pub fn report(platform: &mut dyn Platform, err: &Error) {
    error!(kind = %err.kind(), code = %err.code(), "{}", err);
    platform.unmount_all();
    platform.println(&err.to_string());
    platform.println(&format!("Error Code: {}", err.code()));
    platform.println(ACKNOWLEDGE_PROMPT);
}

/// Poll input once per frame until the acknowledgement button is pressed
pub fn wait_for_acknowledgement(platform: &mut dyn Platform) {
    while !platform.acknowledge_pressed() {
        platform.wait_for_vsync();
    }
}

/// Report `err`, wait for acknowledgement, then terminate
pub fn halt(platform: &mut dyn Platform, err: &Error) -> ! {
    report(platform, err);
    wait_for_acknowledgement(platform);
    platform.exit(0)
}
