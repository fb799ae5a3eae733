#![no_main]

use cambium_fuzz_utils::{run_sequence, AtomicCounted, CommandSequence};
use libfuzzer_sys::fuzz_target;

// Heap-owning elements, so that a missed or doubled drop shows up under the sanitizer
fuzz_target!(|cmds: CommandSequence<u16>| {
    let cmds = cmds.map(|n| n.to_string());
    run_sequence::<String, AtomicCounted>(&cmds);
});
