use crate::game::beat_clock::{DEFAULT_BPM, MIN_BPM};
use crate::game::bonus_event::{TIME_GOOD, TIME_MISS, TIME_PERFECT, TimeRewards};
use crate::game::chance::{BonusSlot, ChanceMode, LevelTable, UnlockRequirement};
use crate::game::schedule::{
    DEFAULT_MAX_DELAY_S, DEFAULT_MIN_DELAY_S, DEFAULT_MIN_GAP_S, DEFAULT_NO_SCHEDULE_TAIL_S,
    ScheduleConstraints,
};
use crate::game::session::{
    DEFAULT_BASE_DURATION_S, DEFAULT_MAX_DURATION_S, DEFAULT_SESSION_SECONDS, DirectorSettings,
};
use crate::game::spawn_chain::ChainGate;
use crate::game::timing_windows::{DEFAULT_GOOD_WINDOW_S, DEFAULT_PERFECT_WINDOW_S, JudgeWindows};
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{LazyLock, Mutex, PoisonError};

const CONFIG_PATH: &str = "orebeat.ini";
const SLOTS_PATH: &str = "bonus_slots.json";

pub const DEFAULT_HITS_TO_BREAK: u32 = 8;
pub const DEFAULT_PRESS_JITTER_S: f64 = 0.12;

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: FxHashMap<String, FxHashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content);
        Ok(())
    }

    pub fn parse(&mut self, content: &str) {
        self.sections.clear();
        let mut current_section = String::new();

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current_section = name.trim().to_string();
                self.sections.entry(current_section.clone()).or_default();
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                self.sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn get_section(&self, section: &str) -> Option<&FxHashMap<String, String>> {
        self.sections.get(section)
    }

    fn parsed<T: FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.get(section, key).and_then(|v| v.parse::<T>().ok())
    }

    fn flag(&self, section: &str, key: &str) -> Option<bool> {
        self.parsed::<u8>(section, key).map(|v| v != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    pub session_seconds: f64,
    pub seed: Option<u64>,
    pub press_jitter_seconds: f64,
    pub bpm: f64,
    pub perfect_window_seconds: f64,
    pub good_window_seconds: f64,
    pub auto_miss: bool,
    pub beats_per_note: u64,
    pub note_phase: u64,
    pub min_delay: f64,
    pub max_delay: f64,
    pub no_schedule_tail: f64,
    pub min_gap: f64,
    pub base_duration: f64,
    pub max_duration: f64,
    pub perfect_bonus: f64,
    pub good_bonus: f64,
    pub miss_penalty: f64,
    pub end_on_zero: bool,
    pub hits_to_break: u32,
    pub gate_unlock_id: String,
    pub gate_min_level: i32,
    pub levels: Vec<(String, i32)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            session_seconds: DEFAULT_SESSION_SECONDS,
            seed: None,
            press_jitter_seconds: DEFAULT_PRESS_JITTER_S,
            bpm: DEFAULT_BPM,
            perfect_window_seconds: DEFAULT_PERFECT_WINDOW_S,
            good_window_seconds: DEFAULT_GOOD_WINDOW_S,
            auto_miss: true,
            beats_per_note: 1,
            note_phase: 0,
            min_delay: DEFAULT_MIN_DELAY_S,
            max_delay: DEFAULT_MAX_DELAY_S,
            no_schedule_tail: DEFAULT_NO_SCHEDULE_TAIL_S,
            min_gap: DEFAULT_MIN_GAP_S,
            base_duration: DEFAULT_BASE_DURATION_S,
            max_duration: DEFAULT_MAX_DURATION_S,
            perfect_bonus: TIME_PERFECT,
            good_bonus: TIME_GOOD,
            miss_penalty: TIME_MISS,
            end_on_zero: true,
            hits_to_break: DEFAULT_HITS_TO_BREAK,
            gate_unlock_id: String::new(),
            gate_min_level: 0,
            levels: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_ini(conf: &SimpleIni) -> Self {
        let d = Self::default();
        let finite = |v: f64| v.is_finite();

        let mut levels: Vec<(String, i32)> = conf
            .get_section("Levels")
            .map(|s| {
                s.iter()
                    .filter_map(|(k, v)| v.parse::<i32>().ok().map(|lvl| (k.clone(), lvl)))
                    .collect()
            })
            .unwrap_or_default();
        levels.sort();

        Self {
            log_level: conf
                .get("Options", "LogLevel")
                .and_then(|v| LogLevel::from_str(v).ok())
                .unwrap_or(d.log_level),
            session_seconds: conf
                .parsed::<f64>("Options", "SessionSeconds")
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(d.session_seconds),
            seed: conf.parsed::<u64>("Options", "Seed"),
            press_jitter_seconds: conf
                .parsed::<f64>("Options", "PressJitterSeconds")
                .filter(|v| finite(*v))
                .map_or(d.press_jitter_seconds, f64::abs),
            bpm: conf
                .parsed::<f64>("Rhythm", "Bpm")
                .filter(|v| finite(*v))
                .map_or(d.bpm, |v| v.max(MIN_BPM)),
            perfect_window_seconds: conf
                .parsed::<f64>("Rhythm", "PerfectWindowSeconds")
                .filter(|v| finite(*v))
                .unwrap_or(d.perfect_window_seconds),
            good_window_seconds: conf
                .parsed::<f64>("Rhythm", "GoodWindowSeconds")
                .filter(|v| finite(*v))
                .unwrap_or(d.good_window_seconds),
            auto_miss: conf.flag("Rhythm", "AutoMiss").unwrap_or(d.auto_miss),
            beats_per_note: conf
                .parsed::<u64>("Rhythm", "BeatsPerNote")
                .map_or(d.beats_per_note, |v| v.max(1)),
            note_phase: conf
                .parsed::<u64>("Rhythm", "NotePhase")
                .unwrap_or(d.note_phase),
            min_delay: conf
                .parsed::<f64>("Schedule", "MinDelay")
                .filter(|v| finite(*v))
                .unwrap_or(d.min_delay),
            max_delay: conf
                .parsed::<f64>("Schedule", "MaxDelay")
                .filter(|v| finite(*v))
                .unwrap_or(d.max_delay),
            no_schedule_tail: conf
                .parsed::<f64>("Schedule", "NoScheduleTail")
                .filter(|v| finite(*v))
                .unwrap_or(d.no_schedule_tail),
            min_gap: conf
                .parsed::<f64>("Schedule", "MinGap")
                .filter(|v| finite(*v))
                .unwrap_or(d.min_gap),
            base_duration: conf
                .parsed::<f64>("BonusEvent", "BaseDuration")
                .filter(|v| finite(*v))
                .unwrap_or(d.base_duration),
            max_duration: conf
                .parsed::<f64>("BonusEvent", "MaxDuration")
                .filter(|v| finite(*v))
                .unwrap_or(d.max_duration),
            perfect_bonus: conf
                .parsed::<f64>("BonusEvent", "PerfectBonus")
                .filter(|v| finite(*v))
                .map_or(d.perfect_bonus, |v| v.max(0.0)),
            good_bonus: conf
                .parsed::<f64>("BonusEvent", "GoodBonus")
                .filter(|v| finite(*v))
                .map_or(d.good_bonus, |v| v.max(0.0)),
            miss_penalty: conf
                .parsed::<f64>("BonusEvent", "MissPenalty")
                .filter(|v| finite(*v))
                .map_or(d.miss_penalty, |v| v.max(0.0)),
            end_on_zero: conf.flag("BonusEvent", "EndOnZero").unwrap_or(d.end_on_zero),
            hits_to_break: conf
                .parsed::<u32>("BonusEvent", "HitsToBreak")
                .unwrap_or(d.hits_to_break),
            gate_unlock_id: conf
                .get("Gate", "UnlockId")
                .map_or(d.gate_unlock_id, str::to_string),
            gate_min_level: conf
                .parsed::<i32>("Gate", "MinLevel")
                .unwrap_or(d.gate_min_level),
            levels,
        }
    }

    pub fn gate(&self) -> Option<ChainGate> {
        if self.gate_unlock_id.is_empty() {
            return None;
        }
        Some(ChainGate {
            unlock_id: self.gate_unlock_id.clone(),
            min_level: self.gate_min_level,
        })
    }

    pub fn level_table(&self) -> LevelTable {
        self.levels.iter().cloned().collect()
    }

    pub fn director_settings(&self, slots: Vec<BonusSlot>) -> DirectorSettings {
        DirectorSettings {
            session_seconds: self.session_seconds,
            bpm: self.bpm,
            windows: JudgeWindows::new(self.perfect_window_seconds, self.good_window_seconds),
            auto_miss: self.auto_miss,
            beats_per_note: self.beats_per_note,
            note_phase: self.note_phase,
            constraints: ScheduleConstraints {
                min_delay: self.min_delay,
                max_delay: self.max_delay,
                no_schedule_tail: self.no_schedule_tail,
                min_gap: self.min_gap,
            },
            base_duration: self.base_duration,
            max_duration: self.max_duration,
            rewards: TimeRewards {
                perfect_bonus: self.perfect_bonus,
                good_bonus: self.good_bonus,
                miss_penalty: self.miss_penalty,
            },
            end_on_zero: self.end_on_zero,
            slots,
            gate: self.gate(),
        }
    }
}

// Global, mutable configuration instance.
static CONFIG: LazyLock<Mutex<Config>> = LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

#[inline(always)]
fn flag_str(v: bool) -> &'static str {
    if v { "1" } else { "0" }
}

fn default_config_contents() -> String {
    let d = Config::default();
    let mut content = String::new();

    content.push_str("[Options]\n");
    content.push_str(&format!("LogLevel={}\n", d.log_level.as_str()));
    content.push_str(&format!("PressJitterSeconds={}\n", d.press_jitter_seconds));
    content.push_str("; Seed=12345\n");
    content.push_str(&format!("SessionSeconds={}\n", d.session_seconds));
    content.push('\n');

    content.push_str("[Rhythm]\n");
    content.push_str(&format!("AutoMiss={}\n", flag_str(d.auto_miss)));
    content.push_str(&format!("BeatsPerNote={}\n", d.beats_per_note));
    content.push_str(&format!("Bpm={}\n", d.bpm));
    content.push_str(&format!("GoodWindowSeconds={}\n", d.good_window_seconds));
    content.push_str(&format!("NotePhase={}\n", d.note_phase));
    content.push_str(&format!("PerfectWindowSeconds={}\n", d.perfect_window_seconds));
    content.push('\n');

    content.push_str("[Schedule]\n");
    content.push_str(&format!("MaxDelay={}\n", d.max_delay));
    content.push_str(&format!("MinDelay={}\n", d.min_delay));
    content.push_str(&format!("MinGap={}\n", d.min_gap));
    content.push_str(&format!("NoScheduleTail={}\n", d.no_schedule_tail));
    content.push('\n');

    content.push_str("[BonusEvent]\n");
    content.push_str(&format!("BaseDuration={}\n", d.base_duration));
    content.push_str(&format!("EndOnZero={}\n", flag_str(d.end_on_zero)));
    content.push_str(&format!("GoodBonus={}\n", d.good_bonus));
    content.push_str(&format!("HitsToBreak={}\n", d.hits_to_break));
    content.push_str(&format!("MaxDuration={}\n", d.max_duration));
    content.push_str(&format!("MissPenalty={}\n", d.miss_penalty));
    content.push_str(&format!("PerfectBonus={}\n", d.perfect_bonus));
    content.push('\n');

    content.push_str("[Gate]\n");
    content.push_str("MinLevel=0\n");
    content.push_str("UnlockId=\n");
    content.push('\n');

    content.push_str("[Levels]\n");
    content.push_str("bonus_luck=1\n");
    content.push_str("deep_vein=0\n");
    content
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    std::fs::write(path, default_config_contents())
}

/// Reads `path`, creating it first when missing. Any failure falls back to
/// the defaults with a warning.
pub fn load_from(path: &Path) -> Config {
    if !path.exists()
        && let Err(e) = create_default_config_file(path)
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(path) {
        Ok(()) => Config::from_ini(&conf),
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default values.", path.display());
            Config::default()
        }
    }
}

pub fn load() {
    let cfg = load_from(Path::new(CONFIG_PATH));
    info!(
        "Config loaded: bpm={}, session={}s, seed={:?}, {} level entries",
        cfg.bpm,
        cfg.session_seconds,
        cfg.seed,
        cfg.levels.len()
    );
    *CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = cfg;
}

pub fn get() -> Config {
    CONFIG.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

// --- Bonus slot chain ---

pub fn default_slots() -> Vec<BonusSlot> {
    let mut first = BonusSlot::new("big_ore_1", 0.6);
    first.chance_source = Some("bonus_luck".to_string());
    first.per_level_add = 0.05;
    first.max_chance = Some(0.9);

    let mut second = BonusSlot::new("big_ore_2", 0.3);
    second.always_unlocked = false;
    second.unlock = Some(UnlockRequirement {
        source_id: "deep_vein".to_string(),
        min_level: 1,
    });
    second.chance_source = Some("bonus_luck".to_string());
    second.chance_mode = ChanceMode::AdditiveTable;
    second.additive_table = vec![0.05, 0.05, 0.1];

    let mut third = BonusSlot::new("big_ore_3", 0.1);
    third.always_unlocked = false;
    third.unlock = Some(UnlockRequirement {
        source_id: "deep_vein".to_string(),
        min_level: 2,
    });
    third.chance_source = Some("deep_vein".to_string());
    third.chance_mode = ChanceMode::FinalTable;
    third.final_table = vec![0.1, 0.2, 0.35, 0.5];
    third.max_chance = Some(0.5);

    vec![first, second, third]
}

fn parse_slots(content: &str) -> Result<Vec<BonusSlot>, serde_json::Error> {
    serde_json::from_str(content)
}

fn create_default_slots_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("'{}' not found, writing the default bonus chain.", path.display());
    let json = serde_json::to_string_pretty(&default_slots())?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_slots_from(path: &Path) -> Vec<BonusSlot> {
    if !path.exists() {
        if let Err(e) = create_default_slots_file(path) {
            warn!("Failed to create default slot file: {e}");
        }
        return default_slots();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read '{}': {e}. Using the default bonus chain.", path.display());
            return default_slots();
        }
    };
    match parse_slots(&content) {
        Ok(slots) => {
            info!("Loaded {} bonus slots from '{}'", slots.len(), path.display());
            slots
        }
        Err(e) => {
            warn!("Malformed '{}': {e}. Using the default bonus chain.", path.display());
            default_slots()
        }
    }
}

pub fn load_slots() -> Vec<BonusSlot> {
    load_slots_from(Path::new(SLOTS_PATH))
}
