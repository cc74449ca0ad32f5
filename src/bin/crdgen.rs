use kube::CustomResourceExt;
use shoot_admission::resources::{
    cloudprofiles::CloudProfile, controllerregistrations::ControllerRegistration, seeds::Seed,
    shoots::Shoot,
};

fn main() {
    let crds = [
        Shoot::crd(),
        CloudProfile::crd(),
        Seed::crd(),
        ControllerRegistration::crd(),
    ];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd).unwrap())
    }
}
