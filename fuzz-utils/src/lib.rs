use arbitrary::{Arbitrary, Unstructured};
use cambium::mock::{Command, CountingHeap, Runner};
use cambium::param::Memory;
use cambium::transience::TokenTransience;
use std::cell::Cell;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::AtomicUsize;

/// Policy for single-threaded fuzzing: non-atomic refcount, on the counting heap
pub type LocalCounted = Memory<CountingHeap, Cell<usize>, TokenTransience>;
/// Policy for the thread-safe configuration: atomic refcount, on the counting heap
pub type AtomicCounted = Memory<CountingHeap, AtomicUsize, TokenTransience>;

/// Largest capacity given to the first holder of a sequence
const MAX_INITIAL_CAPACITY: u8 = 8;

/// Sequence of [`Command`]s, always starting with a `Make`
///
/// The `Debug` implementation prints the sequence as a test case, so that failures can be copied
/// straight into the crate's runner tests.
pub struct CommandSequence<T> {
    pub cmds: Vec<Command<T>>,
}

impl<T> CommandSequence<T> {
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> CommandSequence<U> {
        let cmds = self.cmds.into_iter().map(|c| map_command(c, &mut f)).collect();
        CommandSequence { cmds }
    }
}

#[rustfmt::skip]
fn map_command<T, U, F: FnMut(T) -> U>(cmd: Command<T>, f: &mut F) -> Command<U> {
    match cmd {
        Command::Make { capacity } => Command::Make { capacity },
        Command::Transient { id } => Command::Transient { id },
        Command::Push { id, value } => Command::Push { id, value: f(value) },
        Command::Set { id, index, value } => Command::Set { id, index, value: f(value) },
        Command::Share { id } => Command::Share { id },
        Command::Copy { id, extra } => Command::Copy { id, extra },
        Command::Commit { id } => Command::Commit { id },
        Command::Drop { id } => Command::Drop { id },
    }
}

impl<'d, T: Arbitrary<'d>> Arbitrary<'d> for CommandSequence<T> {
    fn arbitrary(u: &mut Unstructured<'d>) -> arbitrary::Result<Self> {
        // Commands aimed at an empty set of holders are no-ops, so don't waste input on them
        let capacity = u.int_in_range(0..=MAX_INITIAL_CAPACITY)?;
        let mut cmds = vec![Command::Make { capacity }];

        while !u.is_empty() {
            cmds.push(u.arbitrary()?);
        }

        Ok(CommandSequence { cmds })
    }
}

impl<T: Debug> Debug for CommandSequence<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("#[test]\n")?;
        f.write_str("fn test_case() {\n")?;
        f.write_str("    reset();\n")?;
        f.write_str("    {\n")?;
        f.write_str("        let mut runner: Runner<_, Counted> = Runner::new();\n")?;
        for c in &self.cmds {
            writeln!(f, "        runner.run(&{c:?});")?;
        }
        f.write_str("    }\n")?;
        f.write_str("    assert_no_leaks();\n")?;
        f.write_str("}")
    }
}

/// Runs the whole sequence on a fresh [`Runner`], then checks that every node was released
///
/// The [`CountingHeap`] counters are per-thread; they're reset before the run.
pub fn run_sequence<T, P>(seq: &CommandSequence<T>)
where
    T: Clone + PartialEq + Debug,
    P: cambium::param::MemoryPolicy<Heap = CountingHeap, Transience = TokenTransience>,
{
    CountingHeap::reset();

    {
        let mut runner: Runner<T, P> = Runner::new();
        for c in &seq.cmds {
            runner.run(c);
        }
    }

    let stats = CountingHeap::stats();
    assert_eq!(stats.live_allocations(), 0, "leaked nodes: {stats:?}");
    assert_eq!(stats.live_bytes(), 0, "leaked bytes: {stats:?}");
}
