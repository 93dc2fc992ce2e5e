use log::{debug, info};
use orebeat::config;
use orebeat::game::chance::LevelSource;
use orebeat::game::session::{BonusDirector, DirectorSettings, SessionSummary};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Fixed simulation step (60 Hz).
const STEP: f64 = 1.0 / 60.0;
// Player timing is seeded separately so the director's rolls stay reproducible.
const PLAYER_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    config::load();
    let cfg = config::get();
    log::set_max_level(cfg.log_level.as_level_filter());

    let levels = cfg.level_table();
    let settings = cfg.director_settings(config::load_slots());
    let player = Player {
        jitter_s: cfg.press_jitter_seconds,
        hits_to_break: cfg.hits_to_break as usize,
    };

    let summary = match cfg.seed {
        Some(seed) => {
            info!("Running seeded session (seed={seed})");
            let mut player_rng = StdRng::seed_from_u64(seed ^ PLAYER_SEED_SALT);
            run_session(
                settings,
                StdRng::seed_from_u64(seed),
                &levels,
                &player,
                &mut player_rng,
            )
        }
        None => run_session(settings, rand::rng(), &levels, &player, &mut rand::rng()),
    };

    let t = summary.timing;
    info!(
        "Timing over {} hits: mean {:.1}ms, mean abs {:.1}ms, stddev {:.1}ms, worst {:.1}ms",
        t.count, t.mean_ms, t.mean_abs_ms, t.stddev_ms, t.max_abs_ms
    );
    Ok(())
}

/// Simulated player: presses once per beat with uniform timing error and
/// breaks the big ore after enough qualifying hits.
struct Player {
    jitter_s: f64,
    hits_to_break: usize,
}

impl Player {
    fn press_time<P: Rng>(&self, beat_time: f64, rng: &mut P) -> f64 {
        if self.jitter_s > 0.0 {
            beat_time + rng.random_range(-self.jitter_s..=self.jitter_s)
        } else {
            beat_time
        }
    }
}

fn run_session<R: Rng, P: Rng>(
    settings: DirectorSettings,
    rng: R,
    levels: &dyn LevelSource,
    player: &Player,
    player_rng: &mut P,
) -> SessionSummary {
    let mut director = BonusDirector::new(settings, rng);
    director.start(0.0, Some(levels));

    let mut target_beat: u64 = 1;
    let mut next_press = player.press_time(director.clock().beat_time(target_beat), player_rng);
    let mut event_first_judgment: Option<usize> = None;
    let mut frame: u64 = 0;

    loop {
        frame += 1;
        let now = frame as f64 * STEP;
        if !director.tick(now) {
            break;
        }

        if now >= next_press {
            if let Some(j) = director.press(now) {
                debug!(
                    "Press at {now:.3}: {:?} ({:+.1}ms, beat {})",
                    j.grade,
                    j.time_error_s * 1000.0,
                    j.beat_index
                );
            }
            let clock = director.clock();
            target_beat = (clock.beat_index_at(now) + 1).max(target_beat + 1);
            next_press = player.press_time(clock.beat_time(target_beat), player_rng);
        }

        if director.lifecycle().is_active() {
            let since = *event_first_judgment.get_or_insert(director.judgments().len());
            if director.qualifying_hits_since(since) >= player.hits_to_break {
                info!("Big ore broken at {now:.2}s");
                director.succeed_event();
                event_first_judgment = None;
            }
        } else {
            event_first_judgment = None;
        }
    }

    director.summary()
}
