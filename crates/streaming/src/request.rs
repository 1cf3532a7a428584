use foundation::{FloorId, Step};
use formats::{FloorConfig, ViewerConfig};

/// `<dir>/step-NN.<ext>`, with the step zero-padded to two digits.
pub fn image_url(dir: &str, step: Step, ext: &str) -> String {
    format!(
        "{}/step-{step:02}.{}",
        dir.trim_end_matches('/'),
        ext.trim_start_matches('.')
    )
}

/// The image set of one floor: where its step images live and how many exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    pub floor: FloorId,
    pub dir: String,
    pub ext: String,
    pub total_steps: Step,
}

impl ImageSet {
    pub fn for_floor(config: &ViewerConfig, floor: &FloorConfig) -> Self {
        Self {
            floor: floor.id.clone(),
            dir: config.image_dir(floor),
            ext: config.image_ext.clone(),
            total_steps: floor.total_steps,
        }
    }

    pub fn contains(&self, step: Step) -> bool {
        (1..=self.total_steps).contains(&step)
    }

    pub fn url(&self, step: Step) -> String {
        image_url(&self.dir, step, &self.ext)
    }
}
