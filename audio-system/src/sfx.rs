use std::fmt;
use std::sync::Arc;

/// Attenuation classes carried by sound requests.
pub const ATTN_NONE: f32 = 0.0;
pub const ATTN_NORM: f32 = 1.0;
pub const ATTN_IDLE: f32 = 2.0;
pub const ATTN_STATIC: f32 = 3.0;

/// Distance multiplier used for entity loop sounds.
pub const LOOP_ATTENUATE: f32 = 0.003;
/// Attenuation handed to autosound activations (`LOOP_ATTENUATE / 0.0002`).
pub const AUTOSOUND_ATTENUATION: f32 = LOOP_ATTENUATE / 0.0002;

const ROLLOFF_SCALE: f32 = 0.001;
const STATIC_ROLLOFF_SCALE: f32 = 0.005;

/// Map a request attenuation onto the engine's rolloff factor.
pub fn rolloff_for(attenuation: f32) -> f32 {
    if attenuation == ATTN_STATIC {
        attenuation * STATIC_ROLLOFF_SCALE
    } else {
        attenuation * ROLLOFF_SCALE
    }
}

/// A registered sound asset. Identity, not name, is what binds a voice to it.
pub struct Sfx {
    name: String,
}

pub type SfxRef = Arc<Sfx>;

impl Sfx {
    pub fn new(name: impl Into<String>) -> SfxRef {
        Arc::new(Sfx { name: name.into() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the engine loads this sound from. `#`-prefixed names are taken
    /// verbatim, everything else lives under `sound/`.
    pub fn asset_path(&self) -> String {
        match self.name.strip_prefix('#') {
            Some(path) => path.to_string(),
            None => format!("sound/{}", self.name),
        }
    }
}

impl fmt::Debug for Sfx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sfx({})", self.name)
    }
}

/// Two references name the same registered sound.
pub fn same_sfx(a: &SfxRef, b: &SfxRef) -> bool {
    Arc::ptr_eq(a, b)
}
