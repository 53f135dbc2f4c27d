use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

/// Tunable knobs merged into a VOICEVOX audio query before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Speed,
    Pitch,
    Intonation,
    Volume,
    PreSilence,
    PostSilence,
}

impl ParamKind {
    pub const ALL: [ParamKind; 6] = [
        ParamKind::Speed,
        ParamKind::Pitch,
        ParamKind::Intonation,
        ParamKind::Volume,
        ParamKind::PreSilence,
        ParamKind::PostSilence,
    ];

    /// Inclusive range the value is clamped to.
    pub fn range(self) -> (f64, f64) {
        match self {
            ParamKind::Speed => (0.5, 2.0),
            ParamKind::Pitch => (-1.0, 1.0),
            ParamKind::Intonation => (0.0, 2.0),
            ParamKind::Volume => (0.0, 2.0),
            ParamKind::PreSilence | ParamKind::PostSilence => (0.0, 1.5),
        }
    }

    /// Key of this parameter inside an audio query.
    pub fn recipe_key(self) -> &'static str {
        match self {
            ParamKind::Speed => "speedScale",
            ParamKind::Pitch => "pitchScale",
            ParamKind::Intonation => "intonationScale",
            ParamKind::Volume => "volumeScale",
            ParamKind::PreSilence => "prePhonemeLength",
            ParamKind::PostSilence => "postPhonemeLength",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamKind::Speed => "speed",
            ParamKind::Pitch => "pitch",
            ParamKind::Intonation => "intonation",
            ParamKind::Volume => "volume",
            ParamKind::PreSilence => "pre_silence",
            ParamKind::PostSilence => "post_silence",
        }
    }

    pub fn clamp(self, value: f64) -> f64 {
        let (min, max) = self.range();
        if value.is_nan() {
            return min;
        }
        value.clamp(min, max)
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ParamKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized || kind.recipe_key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Speech parameters for one guild; every field stays inside its [`ParamKind::range`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceParameters {
    pub speed: f64,
    pub pitch: f64,
    pub intonation: f64,
    pub volume: f64,
    pub pre_silence: f64,
    pub post_silence: f64,
}

impl VoiceParameters {
    /// High, energetic and slightly fast: the preset the bot starts with.
    pub const PRESET: VoiceParameters = VoiceParameters {
        speed: 1.15,
        pitch: 0.6,
        intonation: 1.2,
        volume: 1.0,
        pre_silence: 0.1,
        post_silence: 0.1,
    };

    pub fn get(&self, kind: ParamKind) -> f64 {
        match kind {
            ParamKind::Speed => self.speed,
            ParamKind::Pitch => self.pitch,
            ParamKind::Intonation => self.intonation,
            ParamKind::Volume => self.volume,
            ParamKind::PreSilence => self.pre_silence,
            ParamKind::PostSilence => self.post_silence,
        }
    }

    /// Stores the clamped value and returns what was actually stored.
    pub fn set(&mut self, kind: ParamKind, value: f64) -> f64 {
        let clamped = kind.clamp(value);
        let slot = match kind {
            ParamKind::Speed => &mut self.speed,
            ParamKind::Pitch => &mut self.pitch,
            ParamKind::Intonation => &mut self.intonation,
            ParamKind::Volume => &mut self.volume,
            ParamKind::PreSilence => &mut self.pre_silence,
            ParamKind::PostSilence => &mut self.post_silence,
        };
        *slot = clamped;
        clamped
    }

    /// Overwrites the matching keys of an audio query, leaving every other field as the engine produced it.
    pub fn apply_to(&self, recipe: &mut Map<String, Value>) {
        for kind in ParamKind::ALL {
            recipe.insert(kind.recipe_key().to_string(), Value::from(self.get(kind)));
        }
    }
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self::PRESET
    }
}

/// Everything the synthesis client needs to know about how a guild should sound.
///
/// Synthesis works on a copy taken when the request starts; a change made while a
/// request is in flight only affects later requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub speaker_name: String,
    pub style_name: String,
    pub params: VoiceParameters,
}

impl VoiceProfile {
    pub fn new(speaker_name: impl Into<String>, style_name: impl Into<String>) -> Self {
        Self {
            speaker_name: speaker_name.into(),
            style_name: style_name.into(),
            params: VoiceParameters::PRESET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_clamps_both_ends_of_every_range() {
        let mut params = VoiceParameters::default();

        assert_eq!(params.set(ParamKind::Speed, 3.0), 2.0);
        assert_eq!(params.set(ParamKind::Speed, 0.1), 0.5);
        assert_eq!(params.set(ParamKind::Pitch, -5.0), -1.0);
        assert_eq!(params.set(ParamKind::Pitch, 5.0), 1.0);
        assert_eq!(params.set(ParamKind::Intonation, -1.0), 0.0);
        assert_eq!(params.set(ParamKind::Intonation, 9.0), 2.0);
        assert_eq!(params.set(ParamKind::Volume, -0.5), 0.0);
        assert_eq!(params.set(ParamKind::Volume, 2.5), 2.0);
        assert_eq!(params.set(ParamKind::PreSilence, -1.0), 0.0);
        assert_eq!(params.set(ParamKind::PostSilence, 4.0), 1.5);

        assert_eq!(params.speed, 0.5);
        assert_eq!(params.pitch, 1.0);
    }

    #[test]
    fn test_in_range_values_are_kept() {
        let mut params = VoiceParameters::default();
        assert_eq!(params.set(ParamKind::Speed, 1.3), 1.3);
        assert_eq!(params.get(ParamKind::Speed), 1.3);
    }

    #[test]
    fn test_nan_falls_to_lower_bound() {
        assert_eq!(ParamKind::Speed.clamp(f64::NAN), 0.5);
    }

    #[test]
    fn test_parse_param_names() {
        assert_eq!("speed".parse::<ParamKind>(), Ok(ParamKind::Speed));
        assert_eq!(" Pitch ".parse::<ParamKind>(), Ok(ParamKind::Pitch));
        assert_eq!("pre-silence".parse::<ParamKind>(), Ok(ParamKind::PreSilence));
        assert_eq!("intonationScale".parse::<ParamKind>(), Ok(ParamKind::Intonation));
        assert!("tempo".parse::<ParamKind>().is_err());
    }

    #[test]
    fn test_apply_overrides_only_known_keys() {
        let mut recipe = json!({
            "accent_phrases": [{"moras": []}],
            "speedScale": 1.0,
            "pitchScale": 0.0,
            "outputSamplingRate": 24000,
            "kana": "コンニチワ"
        })
        .as_object()
        .cloned()
        .unwrap();

        VoiceParameters::PRESET.apply_to(&mut recipe);

        assert_eq!(recipe["speedScale"], json!(1.15));
        assert_eq!(recipe["pitchScale"], json!(0.6));
        assert_eq!(recipe["intonationScale"], json!(1.2));
        assert_eq!(recipe["postPhonemeLength"], json!(0.1));
        assert_eq!(recipe["outputSamplingRate"], json!(24000));
        assert_eq!(recipe["kana"], json!("コンニチワ"));
        assert_eq!(recipe["accent_phrases"], json!([{"moras": []}]));
    }
}
