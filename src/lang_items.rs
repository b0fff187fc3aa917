//! Language items and default exception handlers

// When defmt feature is enabled on ARM targets, use defmt_rtt and panic_probe
#[cfg(all(feature = "defmt", target_arch = "arm"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use panic_probe as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
#[defmt::panic_handler]
fn defmt_panic() -> ! {
    cortex_m::asm::udf()
}

// Halt on panic when defmt is disabled
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
use panic_halt as _;

#[cfg(target_arch = "arm")]
#[cortex_m_rt::exception]
unsafe fn HardFault(_ef: &cortex_m_rt::ExceptionFrame) -> ! {
    crate::error!("hard fault at pc={=u32:#x}", _ef.pc());
    cortex_m::asm::udf()
}

#[cfg(all(feature = "defmt", target_arch = "arm"))]
defmt::timestamp!("{=u32}", crate::port::cortex_m4::uptime_ticks());
