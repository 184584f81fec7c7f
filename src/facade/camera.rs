//! Camera, optics and rendering.

use super::{fixed, params, ResponseFields};
use crate::error::{Result, SurrenderError};
use crate::image::Image;
use crate::protocol::{Variant, VariantMap};
use crate::Session;

impl Session {
    pub async fn set_image_size(&self, width: u32, height: u32) -> Result<()> {
        let params = params([("width", width.into()), ("height", height.into())]);
        self.exec("setImageSize", params).await
    }

    /// `(width, height)` in pixels.
    pub async fn get_image_size(&self) -> Result<(usize, usize)> {
        let response = self.call("getImageSize", VariantMap::new()).await?;
        let [width, height] = fixed::<2>(&response, "size")?;
        if width < 0.0 || height < 0.0 {
            return Err(SurrenderError::UnexpectedType {
                field: "size".to_string(),
                expected: "a non-negative size",
            });
        }
        Ok((width as usize, height as usize))
    }

    /// Field of view in degrees.
    pub async fn set_camera_fov_deg(&self, fov_x: f64, fov_y: f64) -> Result<()> {
        let params = params([("fov_x", fov_x.into()), ("fov_y", fov_y.into())]);
        self.exec("setCameraFOVDeg", params).await
    }

    pub async fn get_camera_fov_deg(&self) -> Result<[f64; 2]> {
        let response = self.call("getCameraFOVDeg", VariantMap::new()).await?;
        fixed(&response, "fov")
    }

    /// Sun power per spectral band.
    pub async fn set_sun_power(&self, sun_color: &[f64]) -> Result<()> {
        self.exec("setSunPower", params([("sun_color", sun_color.into())]))
            .await
    }

    pub async fn set_nb_samples_per_pixel(&self, nb_samples: u32) -> Result<()> {
        self.exec("setNbSamplesPerPixel", params([("nb_samples", nb_samples.into())]))
            .await
    }

    pub async fn get_nb_samples_per_pixel(&self) -> Result<usize> {
        let response = self.call("getNbSamplesPerPixel", VariantMap::new()).await?;
        response.usize_field("nb_samples")
    }

    pub async fn enable_raytracing(&self, enable: bool) -> Result<()> {
        self.exec("enableRaytracing", params([("enable", enable.into())]))
            .await
    }

    /// Render a frame with the current scene.
    pub async fn render(&self) -> Result<()> {
        self.exec("render", VariantMap::new()).await
    }

    /// Replace the PSF with a single-channel weight matrix.
    ///
    /// Negative supports let the server derive them from the matrix size.
    /// Samples farther than `blooming_threshold_distance` count as tail.
    pub async fn set_psf(
        &self,
        psf: &Image<f32>,
        support_w: f64,
        support_h: f64,
        blooming_threshold_distance: i32,
    ) -> Result<()> {
        if psf.channels() != 1 {
            return Err(SurrenderError::InvalidArgument(format!(
                "PSF must have one channel, got {}",
                psf.channels()
            )));
        }
        let params = params([
            ("w", psf.width().into()),
            ("h", psf.height().into()),
            ("psf", Variant::bytes(psf.to_le_bytes())),
            ("support_w", support_w.into()),
            ("support_h", support_h.into()),
            ("blooming_threshold_distance", blooming_threshold_distance.into()),
        ]);
        self.call("setPSF", params).await.map(drop)
    }

    /// The active PSF, rows in server order.
    pub async fn get_psf(&self) -> Result<Image<f32>> {
        let response = self.call("getPSF", VariantMap::new()).await?;
        let width = response.usize_field("width")?;
        let height = response.usize_field("height")?;
        Image::from_le_bytes(width, height, 1, response.bytes_field("psf")?)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SurrenderError;
    use crate::facade::testing::session;
    use crate::image::Image;
    use crate::protocol::{Variant, VariantMap, COMMAND_KEY};
    use crate::Session;

    #[tokio::test]
    async fn test_get_image_size() {
        let (session, mut peer) = session(Session::builder()).await;
        let mut fields = VariantMap::new();
        fields.insert("size".into(), Variant::list([640, 480]));
        peer.respond("getImageSize", fields).await;

        assert_eq!(session.get_image_size().await.unwrap(), (640, 480));
        assert_eq!(peer.request().await.len(), 1);
    }

    #[tokio::test]
    async fn test_setters_in_async_mode_do_not_wait() {
        let (session, mut peer) = session(Session::builder()).await;

        session.set_image_size(1024, 768).await.unwrap();
        session.set_camera_fov_deg(10.0, 7.5).await.unwrap();
        session.enable_raytracing(true).await.unwrap();
        session.render().await.unwrap();

        let size = peer.request().await;
        assert_eq!(size["width"], Variant::Int32(1024));
        assert_eq!(size["height"], Variant::Int32(768));
        assert_eq!(peer.request().await["fov_y"], Variant::Double(7.5));
        assert_eq!(peer.request().await["enable"], Variant::Bool(true));
        assert_eq!(peer.request().await[COMMAND_KEY], Variant::from("render"));
    }

    #[tokio::test]
    async fn test_psf_round_trip() {
        let (session, mut peer) = session(Session::builder()).await;
        let psf = Image::new(3, 2, 1, vec![0.0f32, 0.1, 0.0, 0.2, 0.5, 0.2]).unwrap();

        peer.respond("setPSF", VariantMap::new()).await;
        session.set_psf(&psf, -1.0, -1.0, 0).await.unwrap();
        let request = peer.request().await;
        assert_eq!(request["w"], Variant::Int32(3));
        assert_eq!(request["h"], Variant::Int32(2));
        assert_eq!(request["support_w"], Variant::Double(-1.0));

        let mut fields = VariantMap::new();
        fields.insert("width".into(), Variant::Int32(3));
        fields.insert("height".into(), Variant::Int32(2));
        fields.insert("psf".into(), request["psf"].clone());
        peer.respond("getPSF", fields).await;

        assert_eq!(session.get_psf().await.unwrap(), psf);
    }

    #[tokio::test]
    async fn test_multichannel_psf_is_rejected() {
        let (session, _peer) = session(Session::builder()).await;
        let psf = Image::new(1, 1, 2, vec![0.5f32, 0.5]).unwrap();

        let err = session.set_psf(&psf, 1.0, 1.0, 0).await.unwrap_err();

        assert!(matches!(err, SurrenderError::InvalidArgument(_)));
    }
}
