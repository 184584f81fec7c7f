//! Scene construction and object state.

use super::{fixed, params, ResponseFields};
use crate::error::Result;
use crate::protocol::{Variant, VariantMap};
use crate::Session;

impl Session {
    /// Create a BRDF named `name` from the SuMoL file `filename`.
    pub async fn create_brdf(&self, name: &str, filename: &str, parameters: &[f64]) -> Result<()> {
        let params = params([
            ("name", name.into()),
            ("filename", filename.into()),
            ("parameters", parameters.into()),
        ]);
        self.exec("createBRDF", params).await
    }

    /// Create a shape named `name` from the SuMoL file `filename`.
    pub async fn create_shape(&self, name: &str, filename: &str, parameters: &[f64]) -> Result<()> {
        let params = params([
            ("name", name.into()),
            ("filename", filename.into()),
            ("parameters", parameters.into()),
        ]);
        self.exec("createShape", params).await
    }

    /// Create an object from a shape and a BRDF.
    ///
    /// `textures` are, in order: diffuse, specular, emission and normal maps.
    pub async fn create_body(
        &self,
        body_name: &str,
        shape_name: &str,
        brdf_name: &str,
        textures: &[&str],
    ) -> Result<()> {
        let params = params([
            ("body_name", body_name.into()),
            ("shape_name", shape_name.into()),
            ("brdf_name", brdf_name.into()),
            ("textures", Variant::list(textures.iter().copied())),
        ]);
        self.exec("createBody", params).await
    }

    /// Create an object from a mesh file.
    pub async fn create_mesh(&self, object_name: &str, model_name: &str, scale: f64) -> Result<()> {
        let params = params([
            ("object_name", object_name.into()),
            ("model_name", model_name.into()),
            ("scale", scale.into()),
        ]);
        self.exec("createMesh", params).await
    }

    pub async fn create_light(
        &self,
        light_name: &str,
        spectrum: &[f64],
        cutoff: f64,
        exponent: f64,
    ) -> Result<()> {
        let params = params([
            ("light_name", light_name.into()),
            ("spectrum", spectrum.into()),
            ("cutoff", cutoff.into()),
            ("exponent", exponent.into()),
        ]);
        self.exec("createLight", params).await
    }

    /// Whether an object named `object_name` exists.
    pub async fn exists(&self, object_name: &str) -> Result<bool> {
        let response = self
            .call("exists", params([("object_name", object_name.into())]))
            .await?;
        response.bool_field("exists")
    }

    /// Remove every object from the scene.
    pub async fn reset(&self) -> Result<()> {
        self.exec("reset", VariantMap::new()).await
    }

    /// Use `"camera"` to move the camera.
    pub async fn set_object_position(&self, object_name: &str, pos: [f64; 3]) -> Result<()> {
        let params = params([("object_name", object_name.into()), ("pos", pos.into())]);
        self.exec("setObjectPosition", params).await
    }

    pub async fn get_object_position(&self, object_name: &str) -> Result<[f64; 3]> {
        let response = self
            .call("getObjectPosition", params([("object_name", object_name.into())]))
            .await?;
        fixed(&response, "pos")
    }

    /// Attitude as a unit quaternion.
    pub async fn set_object_attitude(&self, object_name: &str, attitude: [f64; 4]) -> Result<()> {
        let params = params([
            ("object_name", object_name.into()),
            ("attitude", attitude.into()),
        ]);
        self.exec("setObjectAttitude", params).await
    }

    pub async fn get_object_attitude(&self, object_name: &str) -> Result<[f64; 4]> {
        let response = self
            .call("getObjectAttitude", params([("object_name", object_name.into())]))
            .await?;
        fixed(&response, "attitude")
    }

    /// Set a per-object property such as `photon_map` or `skip_path_tracing`.
    pub async fn set_object_property(&self, name: &str, property: &str, value: f64) -> Result<()> {
        let params = params([
            ("name", name.into()),
            ("property", property.into()),
            ("value", value.into()),
        ]);
        self.exec("setObjectProperty", params).await
    }

    /// The property value as sent by the server; its kind depends on the property.
    pub async fn get_object_property(&self, name: &str, property: &str) -> Result<Variant> {
        let params = params([("name", name.into()), ("property", property.into())]);
        let response = self.call("getObjectProperty", params).await?;
        response.field("value").cloned()
    }
}
