//! 速度制御の状態機械
//!
//! 制御周期ごとに周波数を1つ受け取り、オープンループのMANUAL (始動・失速からの復帰) と
//! クローズドループのPIDを切り替える。PIDが落ち着いたらそのデューティを
//! 次回始動用のキャリブレーションとして保存する。

mod manual_mode;
mod pid_mode;

use crate::calibration::{CalibrationBackend, CalibrationStore};
use crate::command::Command;
use crate::config::GovernorConfig;
use crate::pid::{Pid, PidComponents, PidGains};
use crate::speed::TargetSpeed;
use crate::ticks::TickSpace;

/// 制御モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlMode {
    /// オープンループ（始動・失速からの復帰）
    Manual,
    /// クローズドループPID制御（通常運転）
    Pid,
}

impl ControlMode {
    /// テレメトリ用ラベル
    pub const fn label(&self) -> &'static str {
        match self {
            ControlMode::Manual => "MANUAL",
            ControlMode::Pid => "PID",
        }
    }
}

/// 診断用ステータス (制御には影響しない)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusFlags {
    /// 精度内
    pub hit: bool,
    /// オープンループ制御中
    pub manual: bool,
    /// モータの電源が切られたとみられる
    pub switch_off: bool,
}

/// 制御更新1回の結果
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlOutput {
    /// 生成からの経過時間 [μs]
    pub uptime_us: u64,
    /// 指令デューティ (0.0～1.0)
    pub duty: f32,
    /// 測定周波数 [Hz]
    pub freq: f32,
    pub mode: ControlMode,
    pub status: StatusFlags,
    /// PIDの各項 (PIDモードのみ)
    pub components: Option<PidComponents>,
    /// この更新でキャリブレーションを書き込んだ
    ///
    /// 書き込み中は計数が止まりうるので、呼び出し側は計測窓を捨てること
    /// ([`FrequencyCounter::reset`](crate::frequency::FrequencyCounter::reset))。
    pub persisted: bool,
}

/// モード1回分の判定
enum Step {
    /// このデューティを出す
    Command(f32),
    /// モードを変えて同じサンプルで再評価する
    Switch(ControlMode),
}

/// タコメータ速度ガバナ
pub struct Governor<B: CalibrationBackend> {
    config: GovernorConfig,
    ticks: TickSpace,
    store: CalibrationStore<B>,

    speed: TargetSpeed,
    reference: f32,
    pid: Pid,

    mode: ControlMode,
    state_since: u32,
    duty: f32,

    hit: bool,
    hit_since: Option<u32>,
    captured: bool,
    persisted: bool,

    switch_off_since: Option<u32>,
    switch_off_detected: bool,

    last_tick: u32,
    uptime_us: u64,
}

impl<B: CalibrationBackend> Governor<B> {
    /// `speed`を目標にMANUALモードでガバナを作る
    ///
    /// # 引数
    /// * `config` - しきい値とゲイン
    /// * `ticks` - `now_us`を出すクロックのカウンタ幅
    /// * `store` - キャリブレーションテーブル (読み込み済み)
    /// * `speed` - 初期目標回転数
    /// * `now_us` - 現在のティック
    pub fn new(
        config: GovernorConfig,
        ticks: TickSpace,
        store: CalibrationStore<B>,
        speed: TargetSpeed,
        now_us: u32,
    ) -> Self {
        let reference = speed.reference_hz(config.hz_per_rpm);
        info!(
            "Governor started: speed={} reference={}Hz",
            speed.rpm(),
            reference
        );
        Self {
            pid: Self::fresh_pid(&config, reference),
            config,
            ticks,
            store,
            speed,
            reference,
            mode: ControlMode::Manual,
            state_since: now_us,
            duty: 0.0,
            hit: false,
            hit_since: None,
            captured: false,
            persisted: false,
            switch_off_since: None,
            switch_off_detected: false,
            last_tick: now_us,
            uptime_us: 0,
        }
    }

    /// `reference`を目標とするPID。最初の引き継ぎまで無効
    fn fresh_pid(config: &GovernorConfig, reference: f32) -> Pid {
        let mut pid = Pid::new(
            config.gains(),
            reference,
            config.sample_period(),
            config.output_bounds,
        );
        pid.set_auto_mode(false, 0.0);
        pid
    }

    /// 最新の周波数で制御周期を1回進める
    ///
    /// 1回の呼び出しでモード遷移は最大1回。遷移後のモードが同じサンプルで動く。
    pub fn update(&mut self, freq: f32, now_us: u32) -> ControlOutput {
        let elapsed = self.ticks.diff(now_us, self.last_tick).max(0);
        self.uptime_us += elapsed as u64;
        self.last_tick = now_us;
        self.persisted = false;

        self.hit = self.relative_error(freq) < self.config.accuracy;

        let mut may_switch = true;
        let duty = loop {
            let step = match self.mode {
                ControlMode::Manual => manual_mode::execute(self, freq, now_us, may_switch),
                ControlMode::Pid => pid_mode::execute(self, freq, now_us, may_switch),
            };
            match step {
                Step::Command(duty) => break duty,
                Step::Switch(next) => {
                    self.enter(next, now_us);
                    may_switch = false;
                }
            }
        };

        self.duty = duty.clamp(0.0, 1.0);
        self.output(freq)
    }

    /// 目標回転数を変える
    ///
    /// 新しいPIDでオープンループから始め直す。
    ///
    /// # 戻り値
    /// `speed`がすでに目標なら`false`
    pub fn switch_speed(&mut self, speed: TargetSpeed, now_us: u32) -> bool {
        if speed == self.speed {
            return false;
        }
        self.speed = speed;
        self.reference = speed.reference_hz(self.config.hz_per_rpm);
        self.pid = Self::fresh_pid(&self.config, self.reference);
        self.captured = false;
        self.hit_since = None;
        info!(
            "Target speed -> {} (reference {}Hz)",
            speed.rpm(),
            self.reference
        );
        self.enter(ControlMode::Manual, now_us);
        true
    }

    /// 動作中のPIDのゲインを置き換える
    pub fn set_gains(&mut self, gains: PidGains) {
        self.pid.set_gains(gains);
        info!("PID gains: Kp={} Ki={} Kd={}", gains.kp, gains.ki, gains.kd);
    }

    /// コマンドチャネルの要求を適用する
    pub fn apply(&mut self, command: Command, now_us: u32) {
        match command {
            Command::Kp(kp) => self.config.kp = kp,
            Command::Ti(ti) => self.config.ti = ti,
            Command::Td(td) => self.config.td = td,
            Command::Speed(speed) => {
                self.switch_speed(speed, now_us);
                return;
            }
        }
        let gains = self.config.gains();
        self.set_gains(gains);
    }

    fn enter(&mut self, next: ControlMode, now_us: u32) {
        match next {
            ControlMode::Pid => {
                // 直前の手動デューティからバンプレスに引き継ぐ
                self.pid.set_auto_mode(true, self.duty);
                self.captured = false;
                self.hit_since = None;
            }
            ControlMode::Manual => {
                self.pid.set_auto_mode(false, 0.0);
                self.hit_since = None;
                self.switch_off_since = None;
                self.switch_off_detected = false;
            }
        }
        if next != self.mode {
            info!("Mode {} -> {}", self.mode.label(), next.label());
        }
        self.mode = next;
        self.state_since = now_us;
    }

    fn relative_error(&self, freq: f32) -> f32 {
        if self.reference <= 0.0 {
            return f32::INFINITY;
        }
        libm::fabsf(freq - self.reference) / self.reference
    }

    /// `since`からの経過時間 [ms]
    fn elapsed_ms(&self, since: u32, now_us: u32) -> u32 {
        (self.ticks.diff(now_us, since).max(0) as u32) / 1_000
    }

    fn output(&self, freq: f32) -> ControlOutput {
        ControlOutput {
            uptime_us: self.uptime_us,
            duty: self.duty,
            freq,
            mode: self.mode,
            status: self.status(),
            components: match self.mode {
                ControlMode::Pid => Some(self.pid.components()),
                ControlMode::Manual => None,
            },
            persisted: self.persisted,
        }
    }

    pub fn status(&self) -> StatusFlags {
        StatusFlags {
            hit: self.hit,
            manual: self.mode == ControlMode::Manual,
            switch_off: self.switch_off_detected,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn speed(&self) -> TargetSpeed {
        self.speed
    }

    /// 現在の目標回転数の基準周波数 [Hz]
    pub fn reference(&self) -> f32 {
        self.reference
    }

    /// 直近の指令デューティ
    pub fn duty(&self) -> f32 {
        self.duty
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn store(&self) -> &CalibrationStore<B> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::tests::MemoryBackend;
    use crate::config::DEFAULT_CALIBRATION;

    const PERIOD_US: u32 = 100_000;

    struct Bench {
        gov: Governor<MemoryBackend>,
        now: u32,
    }

    impl Bench {
        fn new(backend: MemoryBackend, defaults: &[(u16, f32)]) -> Self {
            let mut store = CalibrationStore::new(backend);
            store.load_or_defaults(defaults);
            let gov = Governor::new(
                GovernorConfig::default(),
                TickSpace::FULL,
                store,
                TargetSpeed::RPM_33,
                0,
            );
            Self { gov, now: 0 }
        }

        fn with_defaults() -> Self {
            Self::new(MemoryBackend::default(), DEFAULT_CALIBRATION)
        }

        fn reference(&self) -> f32 {
            self.gov.reference()
        }

        fn step(&mut self, freq: f32) -> ControlOutput {
            self.now = self.now.wrapping_add(PERIOD_US);
            self.gov.update(freq, self.now)
        }

        fn steps(&mut self, freq: f32, n: usize) -> ControlOutput {
            let mut last = self.step(freq);
            for _ in 1..n {
                last = self.step(freq);
            }
            last
        }

        fn ratio(&mut self, ratio: f32) -> ControlOutput {
            let freq = self.reference() * ratio;
            self.step(freq)
        }

        fn writes(&self) -> usize {
            self.gov.store().backend().writes
        }

        /// MANUAL(0.5) → 基準周波数でPID
        fn settle_in_pid(&mut self) {
            self.ratio(0.7);
            let out = self.ratio(1.0);
            assert_eq!(out.mode, ControlMode::Pid);
        }
    }

    #[test]
    fn test_reference_frequency() {
        let bench = Bench::with_defaults();
        assert!((bench.reference() - 520.0).abs() < 1e-3);
        assert_eq!(bench.gov.mode(), ControlMode::Manual);
    }

    #[test]
    fn test_standstill_kicks_full_power() {
        let mut bench = Bench::with_defaults();
        for _ in 0..50 {
            let out = bench.step(0.0);
            assert_eq!(out.mode, ControlMode::Manual);
            assert_eq!(out.duty, 1.0);
            assert!(out.components.is_none());
        }
    }

    #[test]
    fn test_manual_uses_calibrated_duty() {
        let mut bench = Bench::with_defaults();
        let out = bench.ratio(0.7);
        assert_eq!(out.mode, ControlMode::Manual);
        assert!((out.duty - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_manual_without_calibration_uses_fallback() {
        let mut bench = Bench::new(MemoryBackend::default(), &[]);
        let out = bench.ratio(0.7);
        assert_eq!(out.duty, GovernorConfig::default().fallback_duty);
    }

    #[test]
    fn test_near_target_switches_to_pid_in_same_update() {
        let mut bench = Bench::with_defaults();
        bench.ratio(0.7);
        let out = bench.ratio(0.97);
        assert_eq!(out.mode, ControlMode::Pid);
        assert!(out.components.is_some());
        assert!(!out.status.manual);
        // バンプレス: 直前の手動デューティを引き継ぐ
        assert!((out.duty - 0.5).abs() < 1e-6);
        assert!((bench.gov.pid().output() - out.duty).abs() < 1e-6);
    }

    #[test]
    fn test_capture_happens_once_per_activation() {
        let mut bench = Bench::with_defaults();
        bench.settle_in_pid();
        assert!(bench.gov.status().hit);

        bench.steps(bench.reference(), 10);
        assert_eq!(bench.writes(), 0);

        bench.steps(bench.reference(), 20);
        assert_eq!(bench.writes(), 1);
        let captured = bench.gov.store().get(TargetSpeed::RPM_33).unwrap();
        assert!((captured - bench.gov.duty()).abs() < 1e-3);

        bench.steps(bench.reference(), 50);
        assert_eq!(bench.writes(), 1);
    }

    #[test]
    fn test_capture_update_reports_persisted() {
        let mut bench = Bench::with_defaults();
        bench.settle_in_pid();
        let flagged = (0..40).filter(|_| bench.ratio(1.0).persisted).count();
        assert_eq!(flagged, 1);
        assert_eq!(bench.writes(), 1);
        assert!(!bench.ratio(1.0).persisted);
    }

    #[test]
    fn test_failed_write_still_reports_persisted() {
        let mut bench = Bench::new(
            MemoryBackend {
                fail_writes: true,
                ..MemoryBackend::default()
            },
            DEFAULT_CALIBRATION,
        );
        bench.settle_in_pid();
        let flagged = (0..40).filter(|_| bench.ratio(1.0).persisted).count();
        assert_eq!(flagged, 1);
        assert_eq!(bench.gov.mode(), ControlMode::Pid);
    }

    #[test]
    fn test_write_stall_does_not_cause_rewrite_loop() {
        let mut bench = Bench::with_defaults();
        bench.settle_in_pid();
        // 書き込んだ直後の窓は計数が止まり、基準の8割に見える
        let mut stalled = false;
        let mut dips = 0;
        for _ in 0..600 {
            let out = bench.ratio(if stalled { 0.8 } else { 1.0 });
            if stalled {
                dips += 1;
            }
            stalled = out.persisted;
        }
        assert_eq!(bench.writes(), 1);
        assert_eq!(dips, 1);
        assert_eq!(bench.gov.mode(), ControlMode::Pid);
    }

    #[test]
    fn test_hit_interruption_restarts_capture_timer() {
        let mut bench = Bench::with_defaults();
        bench.settle_in_pid();
        bench.steps(bench.reference(), 15);
        // 精度外だがPID継続（0.9以上）
        let out = bench.ratio(0.95);
        assert_eq!(out.mode, ControlMode::Pid);
        assert!(!out.status.hit);

        bench.steps(bench.reference(), 15);
        assert_eq!(bench.writes(), 0);
        bench.steps(bench.reference(), 10);
        assert_eq!(bench.writes(), 1);
    }

    #[test]
    fn test_drop_returns_to_manual_in_same_update() {
        let mut bench = Bench::with_defaults();
        bench.settle_in_pid();
        let out = bench.ratio(0.85);
        assert_eq!(out.mode, ControlMode::Manual);
        assert!(out.components.is_none());
        // 0.85はキック閾値より上 → キャリブレーション値
        assert!((out.duty - 0.5).abs() < 1e-6);
        assert!(!bench.gov.pid().is_auto());
    }

    #[test]
    fn test_switch_speed_restarts_from_manual() {
        let mut bench = Bench::with_defaults();
        bench.settle_in_pid();
        bench.steps(bench.reference(), 10);

        let now = bench.now;
        assert!(bench.gov.switch_speed(TargetSpeed::RPM_45, now));
        assert!(!bench.gov.switch_speed(TargetSpeed::RPM_45, now));
        assert_eq!(bench.gov.mode(), ControlMode::Manual);
        assert!(!bench.gov.pid().is_auto());
        let reference = TargetSpeed::RPM_45.reference_hz(GovernorConfig::default().hz_per_rpm);
        assert!((bench.gov.pid().setpoint() - reference).abs() < 1e-3);
        assert!((bench.reference() - reference).abs() < 1e-3);

        // 新しい速度で改めてキャプチャされる
        bench.ratio(0.7);
        bench.steps(bench.reference(), 30);
        assert_eq!(bench.writes(), 1);
        assert!(bench.gov.store().get(TargetSpeed::RPM_45).is_ok());
    }

    #[test]
    fn test_manual_timeout_hands_over_to_pid() {
        let mut bench = Bench::with_defaults();
        let out = bench.steps(bench.reference() * 0.7, 100);
        assert_eq!(out.mode, ControlMode::Manual);

        // 1回の更新で遷移は1度だけ（PIDの落ち込み判定で戻らない）
        let out = bench.ratio(0.7);
        assert_eq!(out.mode, ControlMode::Pid);
        assert!(out.components.is_some());

        let out = bench.ratio(0.7);
        assert_eq!(out.mode, ControlMode::Manual);
    }

    #[test]
    fn test_switch_off_suppresses_manual_timeout() {
        let mut bench = Bench::with_defaults();
        let out = bench.steps(0.0, 5);
        assert!(!out.status.switch_off);
        let out = bench.steps(0.0, 10);
        assert!(out.status.switch_off);

        let out = bench.steps(0.0, 150);
        assert_eq!(out.mode, ControlMode::Manual);
        assert_eq!(out.duty, 1.0);
    }

    #[test]
    fn test_recovery_from_switch_off_restarts_timeout() {
        let mut bench = Bench::with_defaults();
        let out = bench.steps(0.0, 20);
        assert!(out.status.switch_off);

        let out = bench.ratio(0.7);
        assert!(!out.status.switch_off);
        let out = bench.steps(bench.reference() * 0.7, 90);
        assert_eq!(out.mode, ControlMode::Manual);
    }

    #[test]
    fn test_update_across_clock_wrap() {
        let mut store = CalibrationStore::new(MemoryBackend::default());
        store.load_defaults(DEFAULT_CALIBRATION);
        let start = u32::MAX - 250_000;
        let mut gov = Governor::new(
            GovernorConfig::default(),
            TickSpace::FULL,
            store,
            TargetSpeed::RPM_33,
            start,
        );
        let mut now = start;
        for _ in 0..5 {
            now = now.wrapping_add(PERIOD_US);
            gov.update(0.0, now);
        }
        let out = gov.update(0.0, now.wrapping_add(PERIOD_US));
        assert_eq!(out.uptime_us, 600_000);
    }

    #[test]
    fn test_apply_commands() {
        let mut bench = Bench::with_defaults();
        bench.gov.apply(Command::Kp(0.004), 0);
        bench.gov.apply(Command::Ti(4.0), 0);
        let gains = bench.gov.pid().gains();
        assert!((gains.kp - 0.004).abs() < 1e-9);
        assert!((gains.ki - 0.001).abs() < 1e-9);

        bench.gov.apply(Command::Speed(TargetSpeed::RPM_45), 0);
        assert_eq!(bench.gov.speed(), TargetSpeed::RPM_45);
    }
}
