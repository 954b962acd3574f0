// Fatal error reporting for Imperium
//
// Caller contract violations (double free, reaping a live process, dispatch
// before initialization) and structural invariant violations end up here.
// Nothing in this module returns.
use conquer_once::spin::OnceCell;
use core::fmt;
use core::panic::Location;

use crate::process::context::CpuRegisters;

/// Everything known about a fatal condition at the moment it is raised.
pub struct FatalReport<'a> {
    pub message: fmt::Arguments<'a>,
    pub location: &'static Location<'static>,
    pub registers: Option<&'a CpuRegisters>,
}

impl fmt::Display for FatalReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "!!! imperium kernel panic !!!")?;
        writeln!(f, "reason: {}", self.message)?;
        write!(f, "at: {}:{}", self.location.file(), self.location.line())?;
        if let Some(regs) = self.registers {
            write!(f, "\nregister dump:\n{}", regs)?;
        }
        Ok(())
    }
}

/// Sink for fatal conditions. Implementations must not return.
pub trait FatalReporter: Sync {
    fn report(&self, report: &FatalReport<'_>) -> !;
}

/// Turns a fatal report into a Rust panic.
///
/// Inside a kernel image the panic handler halts the machine; on a hosted
/// target this makes the condition observable to tests.
pub struct PanicReporter;

impl FatalReporter for PanicReporter {
    fn report(&self, report: &FatalReport<'_>) -> ! {
        panic!("{}", report)
    }
}

/// Logs the report once, masks interrupts and halts the CPU forever.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub struct HaltReporter;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
static PANIC_IN_PROGRESS: core::sync::atomic::AtomicBool =
    core::sync::atomic::AtomicBool::new(false);

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
impl FatalReporter for HaltReporter {
    fn report(&self, report: &FatalReport<'_>) -> ! {
        use core::sync::atomic::Ordering;

        x86_64::instructions::interrupts::disable();
        // a report raised while logging the first one must not recurse
        if !PANIC_IN_PROGRESS.swap(true, Ordering::SeqCst) {
            log::error!(target: "core", "{}", report);
            log::error!(target: "core", "system halted. please reboot.");
        }
        loop {
            x86_64::instructions::hlt();
        }
    }
}

static REPORTER: OnceCell<&'static dyn FatalReporter> = OnceCell::uninit();

/// Install the system-wide fatal reporter. Only the first call wins.
pub fn install_reporter(reporter: &'static dyn FatalReporter) -> bool {
    REPORTER.try_init_once(|| reporter).is_ok()
}

/// Hand a fatal condition to the installed reporter (or [`PanicReporter`]).
#[cold]
pub fn report_fatal(
    message: fmt::Arguments<'_>,
    location: &'static Location<'static>,
    registers: Option<&CpuRegisters>,
) -> ! {
    let report = FatalReport {
        message,
        location,
        registers,
    };
    match REPORTER.try_get() {
        Ok(reporter) => reporter.report(&report),
        Err(_) => PanicReporter.report(&report),
    }
}

/// Escalate to the fatal reporter when `cond` does not hold.
#[macro_export]
macro_rules! kassert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fatal::report_fatal(
                format_args!($($arg)+),
                core::panic::Location::caller(),
                None,
            )
        }
    };
}

/// Unconditionally escalate to the fatal reporter.
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)+) => {
        $crate::fatal::report_fatal(
            format_args!($($arg)+),
            core::panic::Location::caller(),
            None,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    fn render(
        message: fmt::Arguments<'_>,
        location: &'static Location<'static>,
        registers: Option<&CpuRegisters>,
    ) -> alloc::string::String {
        format!(
            "{}",
            FatalReport {
                message,
                location,
                registers,
            }
        )
    }

    #[test]
    fn report_renders_reason_and_location() {
        let location = Location::caller();
        let text = render(format_args!("double free of {:#x}", 0x5000), location, None);
        assert!(text.contains("reason: double free of 0x5000"));
        assert!(text.contains(&format!("at: {}:{}", location.file(), location.line())));
        assert!(!text.contains("register dump"));
    }

    #[test]
    fn report_includes_register_dump_when_available() {
        let mut regs = CpuRegisters::default();
        regs.rip = 0xdead_b000;
        let text = render(format_args!("bad context"), Location::caller(), Some(&regs));
        assert!(text.contains("register dump"));
        assert!(text.contains("rip: 0x00000000deadb000"));
    }

    static REPORTS: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);

    struct CountingReporter;

    impl FatalReporter for CountingReporter {
        fn report(&self, report: &FatalReport<'_>) -> ! {
            REPORTS.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
            PanicReporter.report(report)
        }
    }

    static COUNTING: CountingReporter = CountingReporter;

    #[test]
    fn installed_reporter_receives_reports() {
        assert!(install_reporter(&COUNTING));
        assert!(!install_reporter(&PanicReporter));

        let result = std::panic::catch_unwind(|| kfatal!("scheduler: no runnable process"));
        assert!(result.is_err());
        assert!(REPORTS.load(core::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[test]
    #[should_panic(expected = "reason: invariant broken: 7")]
    fn kassert_escalates_through_reporter() {
        let value = 7;
        kassert!(value == 3, "invariant broken: {}", value);
    }
}
