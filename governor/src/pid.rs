// 出力制限とバンプレス切替つきPIDレギュレータ

/// レギュレータのゲイン
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }

    /// 比例ゲインと積分・微分時間からゲインを求める
    ///
    /// # 引数
    /// * `kp` - 比例ゲイン
    /// * `ti` - 積分時間 [s] (`<= 0`で積分項なし)
    /// * `td` - 微分時間 [s]
    pub fn from_time_constants(kp: f32, ti: f32, td: f32) -> Self {
        Self {
            kp,
            ki: if ti > 0.0 { kp / ti } else { 0.0 },
            kd: kp * td,
        }
    }
}

/// 直近の各項の内訳 (診断用)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidComponents {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

/// 固定サンプル周期と出力制限つきのPIDレギュレータ
pub struct Pid {
    gains: PidGains,
    /// 目標値
    setpoint: f32,
    /// サンプル周期 [s]
    sample_period: f32,
    /// 出力下限
    output_min: f32,
    /// 出力上限
    output_max: f32,
    /// 積分項 (Ki倍済み)
    integral: f32,
    /// 前回の測定値 (測定値微分用)
    last_measurement: Option<f32>,
    last_output: f32,
    components: PidComponents,
    /// 自動モード。無効の間`compute`は何もしない
    auto: bool,
    /// 有効化後の最初のcomputeで引き継ぐ出力
    pending_seed: Option<f32>,
}

impl Pid {
    /// PIDレギュレータを作成する (自動モードで開始)
    ///
    /// # 引数
    /// * `gains` - Kp / Ki / Kd
    /// * `setpoint` - 目標値
    /// * `sample_period` - `compute`の呼び出し間隔 [s]
    /// * `bounds` - 出力制限 `(lower, upper)`
    pub fn new(gains: PidGains, setpoint: f32, sample_period: f32, bounds: (f32, f32)) -> Self {
        Self {
            gains,
            setpoint,
            sample_period,
            output_min: bounds.0,
            output_max: bounds.1,
            integral: 0.0,
            last_measurement: None,
            last_output: bounds.0,
            components: PidComponents::default(),
            auto: true,
            pending_seed: None,
        }
    }

    /// 最新の測定値から次の出力を計算する
    ///
    /// # 戻り値
    /// 制御出力 (output_min..output_maxに制限)。無効の間は前回の出力を返し、状態は変えない。
    pub fn compute(&mut self, measurement: f32) -> f32 {
        if !self.auto {
            return self.last_output;
        }

        let error = self.setpoint - measurement;
        let p = self.gains.kp * error;

        let d = match self.last_measurement {
            Some(last) if self.sample_period > 0.0 => {
                -self.gains.kd * (measurement - last) / self.sample_period
            }
            _ => 0.0,
        };

        match self.pending_seed.take() {
            // バンプレス切替: P + I = seed となるよう積分項を再設定
            // 誤差が大きいとIは出力範囲の外に出るため、範囲は出力側で合わせる
            Some(seed) => {
                self.integral = (seed - p).clamp(self.output_min - p, self.output_max - p)
            }
            // アンチワインドアップ: 範囲外にあるIはそれ以上外へは積まない
            None => {
                let integral = self.integral + self.gains.ki * error * self.sample_period;
                self.integral = integral.clamp(
                    self.output_min.min(self.integral),
                    self.output_max.max(self.integral),
                );
            }
        }

        self.components = PidComponents {
            p,
            i: self.integral,
            d,
        };
        self.last_measurement = Some(measurement);
        self.last_output = self.clamp(p + self.integral + d);
        self.last_output
    }

    /// 自動と手動を切り替える
    ///
    /// 無効→有効の切替では次の`compute`が`seed`を返す (その回のD項は0)。
    /// 切替時に指令値が跳ばない。
    pub fn set_auto_mode(&mut self, enabled: bool, seed: f32) {
        if enabled && !self.auto {
            self.pending_seed = Some(self.clamp(seed));
            self.last_measurement = None;
            self.last_output = self.clamp(seed);
        }
        if !enabled {
            self.pending_seed = None;
        }
        self.auto = enabled;
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    /// 直近の各項の内訳
    pub fn components(&self) -> PidComponents {
        self.components
    }

    /// 現在の出力
    pub fn output(&self) -> f32 {
        self.last_output
    }

    /// 現在の積分項
    pub fn integral(&self) -> f32 {
        self.integral
    }

    fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.output_min, self.output_max)
    }
}
