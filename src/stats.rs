//! Simulation statistics collection and reporting.

use serde_json::json;

use crate::mem::MemoryLevel;

/// Counters accumulated by a simulation run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimStats {
    pub cycles: u64,
    pub instructions: u64,
    pub exceptions: u64,
    pub raw_stalls: u64,
    pub waw_stalls: u64,
    pub other_stalls: u64,
}

impl SimStats {
    /// Prints a human-readable summary, including the per-level cache
    /// accounting of the given memory chain.
    pub fn print(&self, memory: &MemoryLevel) {
        let cycles = if self.cycles == 0 { 1 } else { self.cycles };
        let cpi = cycles as f64 / if self.instructions == 0 { 1 } else { self.instructions } as f64;

        println!("\n==========================================================");
        println!("MIPS SIMULATION STATISTICS");
        println!("==========================================================");
        println!("sim_cycles               {}", self.cycles);
        println!("sim_insts                {}", self.instructions);
        println!("sim_cpi                  {cpi:.4}");
        println!("sim_exceptions           {}", self.exceptions);
        println!("----------------------------------------------------------");
        println!("STALLS");
        println!("  stalls.raw             {}", self.raw_stalls);
        println!("  stalls.waw             {}", self.waw_stalls);
        println!("  stalls.other           {}", self.other_stalls);
        println!("----------------------------------------------------------");
        println!("MEMORY HIERARCHY");

        let print_cache = |name: String, operations: u64, hits: u64, misses: u64| {
            let rate = if operations > 0 {
                (misses as f64 / operations as f64) * 100.0
            } else {
                0.0
            };
            println!(
                "  {name:<6} accesses: {operations:<10} | hits: {hits:<10} | miss_rate: {rate:.2}%"
            );
        };

        for level in 0..memory.cache_levels() {
            if let Some(cache) = memory.cache(level) {
                let stats = cache.stats();
                print_cache(
                    format!("L{}", level + 1),
                    stats.operations,
                    stats.hits,
                    stats.misses,
                );
            }
        }
        if memory.cache_levels() == 0 {
            println!("  (no caches configured)");
        }
        println!("==========================================================");
    }

    /// The same report as a JSON value for machine consumption.
    pub fn to_json(&self, memory: &MemoryLevel) -> serde_json::Value {
        let caches: Vec<serde_json::Value> = (0..memory.cache_levels())
            .filter_map(|level| memory.cache(level))
            .map(|cache| {
                let stats = cache.stats();
                json!({
                    "operations": stats.operations,
                    "hits": stats.hits,
                    "misses": stats.misses,
                    "hit_rate": stats.hit_rate(),
                })
            })
            .collect();
        json!({
            "cycles": self.cycles,
            "instructions": self.instructions,
            "exceptions": self.exceptions,
            "stalls": {
                "raw": self.raw_stalls,
                "waw": self.waw_stalls,
                "other": self.other_stalls,
            },
            "caches": caches,
        })
    }
}
