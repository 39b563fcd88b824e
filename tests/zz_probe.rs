fn _p(e: scanback_core::Effect) {
    match e { scanback_core::Effect::TagApi(_) => {}, scanback_core::Effect::Render(_) => {} }
}
